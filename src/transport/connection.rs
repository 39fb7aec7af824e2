/// 传输层：未连接的句柄、已建立的连接与读端
///
/// 写端与选项设置使用连接持有的套接字，读端持有同一套接字的克隆句柄，
/// 所以阻塞读取期间调用方仍然可以写入、设置选项或关闭。

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rustls::{pki_types::ServerName, ClientConfig, ClientConnection};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SecurityMode;
use crate::error::AdapterError;
use crate::options::{ConnectionOptions, OptionsApplier};
use crate::Result;

/// 连接参数
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub read_buffer_size: usize,
}

enum Link {
    /// 尚未连接，记录连接前设置的选项；握手期间 `in_flight` 持有套接字的克隆句柄，
    /// 供 close 唤醒阻塞中的握手
    Unconnected {
        pending: ConnectionOptions,
        in_flight: Option<TcpStream>,
    },
    Connected(Arc<Connection>),
    Closed,
}

/// 传输句柄
///
/// 由 `TransportFactory` 在适配器构造时创建；系统套接字在连接时才打开，
/// 因为地址族要等到域名解析之后才能确定。
pub struct Transport {
    mode: SecurityMode,
    tls_config: Option<Arc<ClientConfig>>,
    server_name: Option<String>,
    link: Mutex<Link>,
}

impl Transport {
    pub(crate) fn plain() -> Self {
        Self {
            mode: SecurityMode::Plain,
            tls_config: None,
            server_name: None,
            link: Mutex::new(Link::unconnected()),
        }
    }

    pub(crate) fn tls(config: Arc<ClientConfig>, server_name: Option<String>) -> Self {
        Self {
            mode: SecurityMode::Tls,
            tls_config: Some(config),
            server_name,
            link: Mutex::new(Link::unconnected()),
        }
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.link.lock(), Link::Connected(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.link.lock(), Link::Closed)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection().map(|c| c.local_addr)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection().map(|c| c.peer_addr)
    }

    fn connection(&self) -> Option<Arc<Connection>> {
        match &*self.link.lock() {
            Link::Connected(connection) => Some(connection.clone()),
            _ => None,
        }
    }

    /// 阻塞连接（在工作器上执行）
    ///
    /// 依次尝试解析出的每个地址；TLS 模式下在返回前完成握手。
    pub(crate) fn connect(&self, host: &str, port: u16, params: ConnectParams) -> Result<Reader> {
        let pending = match &*self.link.lock() {
            Link::Unconnected { pending, .. } => pending.clone(),
            Link::Connected(_) => return Err(AdapterError::connect_error("Socket is already connected", false)),
            Link::Closed => return Err(AdapterError::connect_error("Socket is closed", false)),
        };

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| AdapterError::from_connect_io(&e))?
            .collect();
        if addrs.is_empty() {
            return Err(AdapterError::connect_error(format!("No address associated with host {}", host), false));
        }

        let mut last_error = None;
        let mut stream = None;
        for addr in &addrs {
            match Self::connect_addr(*addr, &pending, params) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(e) => {
                    tracing::debug!("🔌 连接 {} 失败: {}", addr, e.message());
                    last_error = Some(e);
                }
            }
        }
        let stream = match stream {
            Some(stream) => stream,
            None => {
                return Err(last_error
                    .unwrap_or_else(|| AdapterError::connect_error("Connection failed", true)))
            }
        };

        let local_addr = stream.local_addr().map_err(|e| AdapterError::from_connect_io(&e))?;
        let peer_addr = stream.peer_addr().map_err(|e| AdapterError::from_connect_io(&e))?;

        let tls = match &self.tls_config {
            Some(config) => {
                self.track_in_flight(&stream)?;
                let handshake = self.handshake(config, host, &stream, params, &pending);
                self.clear_in_flight();
                Some(Mutex::new(handshake?))
            }
            None => None,
        };

        let reader_stream = stream.try_clone().map_err(|e| AdapterError::from_connect_io(&e))?;
        let connection = Arc::new(Connection {
            stream,
            tls,
            local_addr,
            peer_addr,
        });

        let mut link = self.link.lock();
        match &*link {
            Link::Unconnected { pending: latest, .. } => {
                // 连接期间又设置过的选项
                if *latest != pending {
                    OptionsApplier::apply(SockRef::from(&connection.stream), latest)
                        .map_err(|e| AdapterError::connect_error(e.message(), false))?;
                }
            }
            Link::Connected(_) => return Err(AdapterError::connect_error("Socket is already connected", false)),
            Link::Closed => {
                let _ = connection.stream.shutdown(Shutdown::Both);
                return Err(AdapterError::connect_error("Socket closed during connect", false));
            }
        }
        *link = Link::Connected(connection.clone());

        Ok(Reader::new(connection, reader_stream, params.read_buffer_size))
    }

    fn connect_addr(addr: SocketAddr, pending: &ConnectionOptions, params: ConnectParams) -> Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| AdapterError::from_connect_io(&e))?;
        socket
            .set_read_timeout(Some(params.read_timeout))
            .map_err(|e| AdapterError::from_connect_io(&e))?;
        OptionsApplier::apply(SockRef::from(&socket), pending)
            .map_err(|e| AdapterError::connect_error(e.message(), false))?;

        socket
            .connect_timeout(&addr.into(), params.connect_timeout)
            .map_err(|e| AdapterError::from_connect_io(&e))?;

        Ok(socket.into())
    }

    fn track_in_flight(&self, stream: &TcpStream) -> Result<()> {
        let handle = stream.try_clone().map_err(|e| AdapterError::from_connect_io(&e))?;
        match &mut *self.link.lock() {
            Link::Unconnected { in_flight, .. } => {
                *in_flight = Some(handle);
                Ok(())
            }
            Link::Connected(_) => Err(AdapterError::connect_error("Socket is already connected", false)),
            Link::Closed => {
                let _ = stream.shutdown(Shutdown::Both);
                Err(AdapterError::connect_error("Socket closed during connect", false))
            }
        }
    }

    fn clear_in_flight(&self) {
        if let Link::Unconnected { in_flight, .. } = &mut *self.link.lock() {
            *in_flight = None;
        }
    }

    /// TLS握手，总耗时不超过 `connect_timeout`
    ///
    /// 握手期间读写超时取剩余时间，完成后恢复为读超时（或待应用的 so_timeout）。
    fn handshake(
        &self,
        config: &Arc<ClientConfig>,
        host: &str,
        stream: &TcpStream,
        params: ConnectParams,
        pending: &ConnectionOptions,
    ) -> Result<ClientConnection> {
        let name = self.server_name.as_deref().unwrap_or(host).to_string();
        let server_name = ServerName::try_from(name)
            .map_err(|e| AdapterError::connect_error(format!("Invalid server name '{}': {}", host, e), false))?;
        let mut tls = ClientConnection::new(config.clone(), server_name)
            .map_err(|e| AdapterError::connect_error(format!("TLS error: {}", e), false))?;

        let deadline = Instant::now() + params.connect_timeout;
        let mut io = stream;
        while tls.is_handshaking() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AdapterError::connect_error("TLS handshake timed out", true));
            }
            stream
                .set_read_timeout(Some(remaining))
                .and_then(|_| stream.set_write_timeout(Some(remaining)))
                .map_err(|e| AdapterError::from_connect_io(&e))?;

            while tls.wants_write() {
                tls.write_tls(&mut io).map_err(handshake_failed)?;
            }
            match tls.read_tls(&mut io) {
                Ok(0) => return Err(AdapterError::connect_error("TLS handshake failed: connection closed", false)),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(handshake_failed(e)),
            }
            if let Err(e) = tls.process_new_packets() {
                // 尽量把告警发给对端
                let _ = tls.write_tls(&mut io);
                return Err(AdapterError::connect_error(format!("TLS handshake failed: {}", e), false));
            }
        }
        while tls.wants_write() {
            tls.write_tls(&mut io).map_err(handshake_failed)?;
        }

        let read_timeout = pending
            .so_timeout
            .map_or(Some(params.read_timeout), OptionsApplier::read_timeout);
        stream
            .set_read_timeout(read_timeout)
            .and_then(|_| stream.set_write_timeout(None))
            .map_err(|e| AdapterError::from_connect_io(&e))?;

        tracing::debug!("🔐 TLS握手完成: {:?}", tls.protocol_version());
        Ok(tls)
    }

    pub(crate) fn write(&self, data: &[u8]) -> Result<()> {
        let connection = self.connection().ok_or_else(AdapterError::not_connected)?;
        connection.write(data).map_err(|e| AdapterError::from_write_io(&e))
    }

    pub(crate) fn shutdown_write(&self) -> Result<()> {
        let connection = self.connection().ok_or_else(AdapterError::not_connected)?;
        connection.shutdown_write().map_err(|e| AdapterError::from_write_io(&e))
    }

    /// 设置选项；未连接时记录下来，在连接前应用
    pub(crate) fn set_options(&self, options: &ConnectionOptions) -> Result<()> {
        let mut link = self.link.lock();
        match &mut *link {
            Link::Unconnected { pending, .. } => {
                *pending = std::mem::take(pending).merge(options);
                Ok(())
            }
            Link::Connected(connection) => OptionsApplier::apply(SockRef::from(&connection.stream), options),
            Link::Closed => Err(AdapterError::options_unavailable("Socket is closed")),
        }
    }

    /// 关闭传输层；已关闭时直接返回
    pub(crate) fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.link.lock(), Link::Closed);
        match previous {
            Link::Connected(connection) => connection.shutdown().map_err(|e| AdapterError::from_close_io(&e)),
            Link::Unconnected { in_flight: Some(stream), .. } => {
                // 唤醒握手中的连接作业
                let _ = stream.shutdown(Shutdown::Both);
                Ok(())
            }
            Link::Unconnected { .. } | Link::Closed => Ok(()),
        }
    }
}

impl Link {
    fn unconnected() -> Self {
        Link::Unconnected {
            pending: ConnectionOptions::default(),
            in_flight: None,
        }
    }
}

fn handshake_failed(error: io::Error) -> AdapterError {
    match error.kind() {
        // 读写超时在 unix 上表现为 WouldBlock
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            AdapterError::connect_error("TLS handshake timed out", true)
        }
        _ => AdapterError::connect_error(format!("TLS handshake failed: {}", error), false),
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.link.lock() {
            Link::Unconnected { .. } => "unconnected",
            Link::Connected(_) => "connected",
            Link::Closed => "closed",
        };
        f.debug_struct("Transport")
            .field("mode", &self.mode)
            .field("state", &state)
            .finish()
    }
}

/// 已建立的连接
pub(crate) struct Connection {
    stream: TcpStream,
    /// 读端与写端共享的TLS状态，阻塞读期间不持有该锁
    tls: Option<Mutex<ClientConnection>>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl Connection {
    fn write(&self, data: &[u8]) -> io::Result<()> {
        match &self.tls {
            None => {
                let mut stream = &self.stream;
                stream.write_all(data)?;
                stream.flush()
            }
            Some(tls) => {
                let mut tls = tls.lock();
                tls.writer().write_all(data)?;
                Self::flush_tls(&mut tls, &self.stream)
            }
        }
    }

    fn shutdown_write(&self) -> io::Result<()> {
        if let Some(tls) = &self.tls {
            let mut tls = tls.lock();
            tls.send_close_notify();
            Self::flush_tls(&mut tls, &self.stream)?;
        }
        self.stream.shutdown(Shutdown::Write)
    }

    fn shutdown(&self) -> io::Result<()> {
        if let Some(tls) = &self.tls {
            let mut tls = tls.lock();
            tls.send_close_notify();
            if let Err(e) = Self::flush_tls(&mut tls, &self.stream) {
                tracing::debug!("🔐 发送 close_notify 失败: {}", e);
            }
        }
        match self.stream.shutdown(Shutdown::Both) {
            // 对端已先行断开
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn flush_tls(tls: &mut ClientConnection, stream: &TcpStream) -> io::Result<()> {
        let mut out = stream;
        while tls.wants_write() {
            tls.write_tls(&mut out)?;
        }
        out.flush()
    }
}

/// 读端，只在工作器上使用
pub(crate) struct Reader {
    connection: Arc<Connection>,
    stream: TcpStream,
    buffer: Vec<u8>,
    max_chunk: usize,
    /// 已解密但尚未交付的数据
    plaintext: BytesMut,
    primed: bool,
    eof: bool,
}

impl Reader {
    fn new(connection: Arc<Connection>, stream: TcpStream, max_chunk: usize) -> Self {
        Self {
            connection,
            stream,
            buffer: vec![0u8; max_chunk],
            max_chunk,
            plaintext: BytesMut::new(),
            primed: false,
            eof: false,
        }
    }

    /// 阻塞读取一块数据，`None` 表示对端已关闭
    pub(crate) fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.connection.tls.is_some() {
            return self.read_tls_chunk();
        }

        loop {
            match self.stream.read(&mut self.buffer) {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(Bytes::copy_from_slice(&self.buffer[..n]))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn read_tls_chunk(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if !self.plaintext.is_empty() {
                let n = self.plaintext.len().min(self.max_chunk);
                return Ok(Some(self.plaintext.split_to(n).freeze()));
            }
            if self.eof {
                return Ok(None);
            }
            if !self.primed {
                // 握手期间可能已经收到应用数据
                self.primed = true;
                self.process_tls(&[])?;
                continue;
            }

            let n = match self.stream.read(&mut self.buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                // 未收到 close_notify 的断开同样视为流结束
                self.eof = true;
                continue;
            }

            let buffer = std::mem::take(&mut self.buffer);
            let processed = self.process_tls(&buffer[..n]);
            self.buffer = buffer;
            processed?;
        }
    }

    fn process_tls(&mut self, mut input: &[u8]) -> io::Result<()> {
        let Some(tls) = self.connection.tls.as_ref() else {
            return Ok(());
        };
        let mut tls = tls.lock();

        loop {
            if !input.is_empty() {
                tls.read_tls(&mut input)?;
            }
            let state = match tls.process_new_packets() {
                Ok(state) => state,
                Err(e) => {
                    // 尽量把告警发给对端
                    let _ = Connection::flush_tls(&mut tls, &self.connection.stream);
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
            };

            let available = state.plaintext_bytes_to_read();
            if available > 0 {
                let start = self.plaintext.len();
                self.plaintext.resize(start + available, 0);
                tls.reader().read_exact(&mut self.plaintext[start..])?;
            }
            if state.peer_has_closed() {
                self.eof = true;
            }
            if input.is_empty() {
                break;
            }
        }

        Connection::flush_tls(&mut tls, &self.connection.stream)
    }
}
