/// TLS适配器集成测试
///
/// 服务端使用 rcgen 生成的自签名证书

mod common;

use common::{
    assert_quiet, next_event, record, self_signed_cert, spawn_server, spawn_tls_server, tls_echo, tls_server_config,
    Event,
};
use socketbridge::{AdapterConfig, AdapterState, SecurityMode, SocketAdapter, TlsConfig, TlsVersion, TrustPolicy};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tls_echo_with_trust_all() {
    common::init_tracing();
    println!("🧪 测试TLS回显（信任任意证书）");

    let cert = self_signed_cert();
    let (addr, server) = spawn_tls_server(tls_server_config(&cert), tls_echo);

    let adapter = SocketAdapter::from_use_ssl(true);
    assert_eq!(adapter.security_mode(), SecurityMode::Tls);
    let mut events = record(&adapter);
    adapter.open("127.0.0.1", addr.port());

    assert_eq!(next_event(&mut events).await, Event::Open);
    adapter.write(&[0x01, 0x02, 0x03]).unwrap();
    assert_eq!(next_event(&mut events).await, Event::Data(vec![0x01, 0x02, 0x03]));

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    assert_quiet(&mut events, Duration::from_millis(300)).await;
    assert_eq!(adapter.state(), AdapterState::Closed);
    server.join().unwrap();
    println!("✅ TLS回显测试通过");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tls13_echo() {
    let cert = self_signed_cert();
    let (addr, server) = spawn_tls_server(tls_server_config(&cert), tls_echo);

    let config = AdapterConfig::tls_insecure().with_tls(TlsConfig::default().with_version(TlsVersion::Tls13));
    let adapter = SocketAdapter::with_config(config);
    let mut events = record(&adapter);
    adapter.open("127.0.0.1", addr.port());

    assert_eq!(next_event(&mut events).await, Event::Open);
    adapter.write(b"over tls 1.3").unwrap();
    assert_eq!(next_event(&mut events).await, Event::Data(b"over tls 1.3".to_vec()));

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_close_notify_ends_stream() {
    let cert = self_signed_cert();
    let (addr, server) = spawn_tls_server(tls_server_config(&cert), |tls| {
        tls.write_all(b"goodbye").unwrap();
        tls.flush().unwrap();
    });

    let adapter = SocketAdapter::new(SecurityMode::Tls);
    let mut events = record(&adapter);
    adapter.open("127.0.0.1", addr.port());

    assert_eq!(next_event(&mut events).await, Event::Open);
    assert_eq!(next_event(&mut events).await, Event::Data(b"goodbye".to_vec()));
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    assert_quiet(&mut events, Duration::from_millis(300)).await;
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_webpki_roots_reject_self_signed() {
    let cert = self_signed_cert();
    let (addr, server) = spawn_tls_server(tls_server_config(&cert), tls_echo);

    let adapter = SocketAdapter::with_config(AdapterConfig::tls_verified());
    let mut events = record(&adapter);
    adapter.open("localhost", addr.port());

    match next_event(&mut events).await {
        Event::OpenError(message) => assert!(!message.is_empty()),
        other => panic!("expected open error, got {:?}", other),
    }
    assert_eq!(adapter.state(), AdapterState::OpenError);

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_custom_ca_accepts_pinned_cert() {
    let cert = self_signed_cert();
    let (addr, server) = spawn_tls_server(tls_server_config(&cert), tls_echo);

    let tls = TlsConfig::default()
        .with_trust_policy(TrustPolicy::CustomCa { ca_cert_pem: cert.cert_pem.clone() })
        .with_server_name("localhost");
    let adapter = SocketAdapter::with_config(AdapterConfig::new(SecurityMode::Tls).with_tls(tls));
    let mut events = record(&adapter);
    adapter.open("127.0.0.1", addr.port());

    assert_eq!(next_event(&mut events).await, Event::Open);
    adapter.write(b"pinned").unwrap();
    assert_eq!(next_event(&mut events).await, Event::Data(b"pinned".to_vec()));

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_tls_config_reported_on_open() {
    let tls = TlsConfig::default().with_trust_policy(TrustPolicy::CustomCa { ca_cert_pem: String::new() });
    let adapter = SocketAdapter::with_config(AdapterConfig::new(SecurityMode::Tls).with_tls(tls));
    let mut events = record(&adapter);

    adapter.open("127.0.0.1", 443);
    match next_event(&mut events).await {
        Event::OpenError(message) => assert!(!message.is_empty()),
        other => panic!("expected open error, got {:?}", other),
    }
    assert_eq!(adapter.state(), AdapterState::Created);

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    assert_eq!(adapter.state(), AdapterState::Closed);
}

/// 接受TCP连接但从不回应TLS握手
fn silent_peer(mut stream: TcpStream) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_peer_handshake_bounded_by_connect_timeout() {
    let (addr, server) = spawn_server(silent_peer);

    let config = AdapterConfig::tls_insecure().with_connect_timeout(Duration::from_millis(500));
    let adapter = SocketAdapter::with_config(config);
    let mut events = record(&adapter);

    let started = Instant::now();
    adapter.open("127.0.0.1", addr.port());

    assert_eq!(
        next_event(&mut events).await,
        Event::OpenError("TLS handshake timed out".to_string())
    );
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    assert_eq!(adapter.state(), AdapterState::OpenError);

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_aborts_pending_handshake() {
    let (addr, server) = spawn_server(silent_peer);

    // 默认 5 秒连接超时
    let adapter = SocketAdapter::new(SecurityMode::Tls);
    let mut events = record(&adapter);
    adapter.open("127.0.0.1", addr.port());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    match next_event(&mut events).await {
        Event::OpenError(message) => assert!(!message.is_empty()),
        other => panic!("expected open error, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(adapter.state(), AdapterState::Closed);
    assert_quiet(&mut events, Duration::from_millis(200)).await;
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_timeout_restored_after_handshake() {
    let cert = self_signed_cert();
    let (addr, server) = spawn_tls_server(tls_server_config(&cert), tls_echo);

    // 握手预算远小于空闲时间，读循环不应沿用握手期间的超时
    let config = AdapterConfig::tls_insecure().with_connect_timeout(Duration::from_millis(300));
    let adapter = SocketAdapter::with_config(config);
    let mut events = record(&adapter);
    adapter.open("127.0.0.1", addr.port());

    assert_eq!(next_event(&mut events).await, Event::Open);
    assert_quiet(&mut events, Duration::from_millis(800)).await;

    adapter.write(b"still open").unwrap();
    assert_eq!(next_event(&mut events).await, Event::Data(b"still open".to_vec()));

    adapter.close().unwrap();
    assert_eq!(next_event(&mut events).await, Event::Close(false));
    server.join().unwrap();
}
