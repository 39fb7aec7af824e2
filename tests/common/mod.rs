//! 集成测试公共工具：回调事件记录与本地测试服务器
#![allow(dead_code)]

use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use socketbridge::SocketAdapter;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// 观察到的回调事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    OpenError(String),
    Data(Vec<u8>),
    Close(bool),
    Error(String),
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 注册全部五类回调，事件按触发顺序进入通道
pub fn record(adapter: &SocketAdapter) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();

    let sender = tx.clone();
    adapter.set_open_handler(move || {
        let _ = sender.send(Event::Open);
    });
    let sender = tx.clone();
    adapter.set_open_error_handler(move |message| {
        let _ = sender.send(Event::OpenError(message));
    });
    let sender = tx.clone();
    adapter.set_data_handler(move |data| {
        let _ = sender.send(Event::Data(data.to_vec()));
    });
    let sender = tx.clone();
    adapter.set_close_handler(move |has_error| {
        let _ = sender.send(Event::Close(has_error));
    });
    adapter.set_error_handler(move |message| {
        let _ = tx.send(Event::Error(message));
    });

    rx
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for adapter event")
        .expect("event channel closed")
}

/// 在给定时间内没有新事件
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Event>, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

/// 收集数据事件直到累计 `len` 字节
pub async fn collect_data(rx: &mut mpsc::UnboundedReceiver<Event>, len: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut total = 0;
    while total < len {
        match next_event(rx).await {
            Event::Data(chunk) => {
                total += chunk.len();
                chunks.push(chunk);
            }
            other => panic!("expected data, got {:?}", other),
        }
    }
    chunks
}

/// 单连接测试服务器，连接交给 `handler` 在独立线程中处理
pub fn spawn_server<F>(handler: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            stream.set_read_timeout(Some(EVENT_TIMEOUT)).unwrap();
            handler(stream);
        }
    });
    (addr, handle)
}

/// 回显服务器：读到多少回写多少，直到对端关闭
pub fn echo(mut stream: TcpStream) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
        }
    }
}

/// 一个已关闭端口，连接会被拒绝
pub fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// backlog 已满的本地监听端口：新的 SYN 被丢弃，连接只能超时
pub struct SaturatedListener {
    pub addr: SocketAddr,
    _listener: socket2::Socket,
    _fillers: Vec<socket2::Socket>,
}

/// 用从不 accept 的连接填满 backlog；无法填满时返回 `None`
pub fn saturated_listener() -> Option<SaturatedListener> {
    use socket2::{Domain, Socket, Type};

    let listener = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    listener.bind(&bind_addr.into()).unwrap();
    listener.listen(0).unwrap();
    let addr = listener.local_addr().unwrap().as_socket().unwrap();

    let mut fillers = Vec::new();
    for _ in 0..32 {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        match socket.connect_timeout(&addr.into(), Duration::from_millis(200)) {
            Ok(()) => fillers.push(socket),
            Err(_) => {
                return Some(SaturatedListener {
                    addr,
                    _listener: listener,
                    _fillers: fillers,
                })
            }
        }
    }
    None
}

/// 自签名证书
pub struct TestCert {
    pub cert_der: CertificateDer<'static>,
    pub cert_pem: String,
    pub key_der: Vec<u8>,
}

pub fn self_signed_cert() -> TestCert {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    TestCert {
        cert_der: certified.cert.der().clone(),
        cert_pem: certified.cert.pem(),
        key_der: certified.key_pair.serialize_der(),
    }
}

pub fn tls_server_config(cert: &TestCert) -> Arc<rustls::ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![cert.cert_der.clone()],
            PrivatePkcs8KeyDer::from(cert.key_der.clone()).into(),
        )
        .unwrap();
    Arc::new(config)
}

/// TLS测试服务器，`handler` 拿到已包装的流（握手在第一次读写时完成）
pub fn spawn_tls_server<F>(config: Arc<rustls::ServerConfig>, handler: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(&mut rustls::StreamOwned<rustls::ServerConnection, TcpStream>) + Send + 'static,
{
    spawn_server(move |stream| {
        let connection = rustls::ServerConnection::new(config).unwrap();
        let mut tls = rustls::StreamOwned::new(connection, stream);
        handler(&mut tls);
        tls.conn.send_close_notify();
        let _ = tls.flush();
    })
}

pub fn tls_echo(tls: &mut rustls::StreamOwned<rustls::ServerConnection, TcpStream>) {
    let mut buf = [0u8; 4096];
    loop {
        match tls.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tls.write_all(&buf[..n]).and_then(|_| tls.flush()).is_err() {
                    break;
                }
            }
        }
    }
}
