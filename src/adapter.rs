/// 单连接套接字适配器
///
/// 把阻塞的TCP/TLS套接字桥接到回调：连接与读循环在适配器自己的工作器上串行执行，
/// 写入、半关闭、设置选项与关闭由调用方线程直接执行。
///
/// 生命周期：`Created -> Connecting -> Open -> Closing -> Closed`，
/// 连接失败进入 `OpenError`。每个实例只支持一次连接尝试。

use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::callbacks::CallbackTable;
use crate::config::{AdapterConfig, SecurityMode};
use crate::error::AdapterError;
use crate::options::ConnectionOptions;
use crate::state::AdapterState;
use crate::stats::{AdapterStats, StatsCounters};
use crate::transport::{ConnectParams, Reader, Transport, TransportFactory};
use crate::worker::Worker;
use crate::{AdapterId, Result};

/// 套接字适配器
///
/// 克隆得到的句柄共享同一连接。
#[derive(Clone)]
pub struct SocketAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    id: AdapterId,
    config: AdapterConfig,
    /// 构造失败时保存错误，在 `open` 时上报
    transport: Result<Transport>,
    /// 读循环的运行标志，由 `close` 置为 false
    running: AtomicBool,
    /// close 回调是否已触发
    close_notified: AtomicBool,
    state: Mutex<AdapterState>,
    callbacks: CallbackTable,
    stats: StatsCounters,
    worker: Worker,
}

impl SocketAdapter {
    /// 创建适配器，必须在 tokio 运行时内调用
    pub fn new(security: SecurityMode) -> Self {
        Self::with_config(AdapterConfig::new(security))
    }

    /// 与宿主侧 `useSSL` 参数对应的构造方式
    pub fn from_use_ssl(use_ssl: bool) -> Self {
        Self::new(SecurityMode::from_use_ssl(use_ssl))
    }

    /// 使用完整配置创建适配器，必须在 tokio 运行时内调用
    pub fn with_config(config: AdapterConfig) -> Self {
        Self::with_handle(config, Handle::current())
    }

    /// 在指定运行时上创建适配器
    pub fn with_handle(config: AdapterConfig, handle: Handle) -> Self {
        let id = AdapterId::next();
        let transport = TransportFactory::create(&config);
        let worker = Worker::spawn(&handle, id);

        tracing::debug!("🆕 创建套接字适配器 {} (模式: {})", id, config.security);

        Self {
            inner: Arc::new(AdapterInner {
                id,
                config,
                transport,
                running: AtomicBool::new(true),
                close_notified: AtomicBool::new(false),
                state: Mutex::new(AdapterState::Created),
                callbacks: CallbackTable::new(),
                stats: StatsCounters::default(),
                worker,
            }),
        }
    }

    pub fn id(&self) -> AdapterId {
        self.inner.id
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.inner.config.security
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    pub fn state(&self) -> AdapterState {
        *self.inner.state.lock()
    }

    /// 读循环运行标志
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.transport.as_ref().ok().and_then(Transport::local_addr)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.transport.as_ref().ok().and_then(Transport::peer_addr)
    }

    pub fn stats(&self) -> AdapterStats {
        self.inner.stats.snapshot()
    }

    /// 异步连接
    ///
    /// 结果只通过回调上报：成功触发 open 回调并开始读循环，失败触发 open-error 回调。
    /// 每次调用恰好触发二者之一。
    pub fn open(&self, host: &str, port: u16) {
        let inner = &self.inner;

        {
            let mut state = inner.state.lock();
            if *state != AdapterState::Created {
                let message = format!("Invalid operation for this socket state: {}", *state);
                drop(state);
                tracing::warn!("⚠️ 适配器 {}: {}", inner.id, message);
                inner.callbacks.invoke_open_error(message);
                return;
            }

            // 构造失败时保持 Created，不提交连接作业
            if let Err(e) = &inner.transport {
                drop(state);
                tracing::error!("❌ 适配器 {} 传输层不可用: {}", inner.id, e);
                inner.stats.record_error();
                inner.callbacks.invoke_open_error(e.message());
                return;
            }
            *state = AdapterState::Connecting;
        }

        tracing::debug!("🔌 适配器 {} 连接到 {}:{}", inner.id, host, port);

        let job_inner = inner.clone();
        let host = host.to_string();
        if inner.worker.submit(move || job_inner.run_connect(&host, port)).is_err() {
            tracing::error!("❌ 适配器 {} 工作器已停止，无法连接", inner.id);
            inner.set_state_from(AdapterState::Connecting, AdapterState::OpenError);
            inner.callbacks.invoke_open_error("Worker is no longer running".to_string());
        }
    }

    /// 直接写入，失败返回给调用方
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let inner = &self.inner;
        let transport = inner.transport.as_ref().map_err(|_| AdapterError::not_connected())?;
        transport.write(data).map_err(|e| {
            tracing::error!("📤 适配器 {} 写入失败: {}", inner.id, e);
            inner.stats.record_error();
            e
        })?;
        inner.stats.record_write(data.len());
        Ok(())
    }

    /// 半关闭发送方向
    pub fn shutdown_write(&self) -> Result<()> {
        let inner = &self.inner;
        let transport = inner.transport.as_ref().map_err(|_| AdapterError::not_connected())?;
        transport.shutdown_write().map_err(|e| {
            tracing::error!("📤 适配器 {} 半关闭失败: {}", inner.id, e);
            inner.stats.record_error();
            e
        })
    }

    /// 关闭连接
    ///
    /// 顺序：先触发 close 回调（`has_error = false`，每个实例最多一次），
    /// 再执行物理关闭，最后清除运行标志。重复调用直接返回 `Ok`。
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// 应用套接字选项，第一个失败的选项即返回错误
    pub fn set_options(&self, options: &ConnectionOptions) -> Result<()> {
        let inner = &self.inner;
        let transport = inner
            .transport
            .as_ref()
            .map_err(|e| AdapterError::options_unavailable(format!("Transport unavailable: {}", e)))?;
        transport.set_options(options).map_err(|e| {
            tracing::error!("⚙️ 适配器 {} 设置选项失败: {}", inner.id, e);
            inner.stats.record_error();
            e
        })
    }

    pub fn set_open_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.set_open(Arc::new(handler));
    }

    pub fn set_open_error_handler<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_open_error(Arc::new(handler));
    }

    pub fn set_data_handler<F>(&self, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_data(Arc::new(handler));
    }

    pub fn set_close_handler<F>(&self, handler: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_close(Arc::new(handler));
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_error(Arc::new(handler));
    }
}

impl std::fmt::Debug for SocketAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketAdapter")
            .field("id", &self.inner.id)
            .field("security", &self.inner.config.security)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

impl AdapterInner {
    fn set_state_from(&self, from: AdapterState, to: AdapterState) -> bool {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            connect_timeout: self.config.connect_timeout,
            read_timeout: self.config.read_timeout,
            read_buffer_size: self.config.read_buffer_size,
        }
    }

    /// 连接作业（工作器上执行）
    fn run_connect(self: Arc<Self>, host: &str, port: u16) {
        let Ok(transport) = &self.transport else {
            return;
        };

        match transport.connect(host, port, self.connect_params()) {
            Ok(reader) => {
                self.set_state_from(AdapterState::Connecting, AdapterState::Open);
                tracing::info!(
                    "✅ 适配器 {} 连接建立: {:?} -> {}:{}",
                    self.id,
                    transport.local_addr(),
                    host,
                    port
                );
                self.callbacks.invoke_open();

                // 读循环排在连接作业之后，同一工作器上串行执行
                let read_inner = self.clone();
                if self.worker.submit(move || read_inner.run_read(reader)).is_err() {
                    tracing::error!("❌ 适配器 {} 工作器已停止，无法启动读循环", self.id);
                }
            }
            Err(e) => {
                tracing::error!("❌ 适配器 {} 连接 {}:{} 失败: {}", self.id, host, port, e);
                self.stats.record_error();
                self.set_state_from(AdapterState::Connecting, AdapterState::OpenError);
                self.callbacks.invoke_open_error(e.message());
            }
        }
    }

    /// 读作业：读循环加统一的收尾处理
    fn run_read(self: Arc<Self>, mut reader: Reader) {
        let result = self.read_loop(&mut reader);
        drop(reader);

        if let Err(e) = result {
            let already_closed = self.transport.as_ref().map(Transport::is_closed).unwrap_or(true);
            if !already_closed {
                tracing::error!("📥 适配器 {} 读取失败: {}", self.id, e);
                self.stats.record_error();
                self.callbacks.invoke_error(e.message());
            } else {
                tracing::debug!("📥 适配器 {} 关闭后读取结束: {}", self.id, e);
            }
        }

        if let Err(e) = self.close() {
            self.callbacks.invoke_error(e.message());
        }
    }

    fn read_loop(&self, reader: &mut Reader) -> Result<()> {
        while self.running.load(Ordering::Acquire) {
            match reader.read_chunk() {
                Ok(Some(chunk)) => {
                    tracing::trace!("📥 适配器 {} 收到 {} bytes", self.id, chunk.len());
                    self.stats.record_chunk(chunk.len());
                    self.callbacks.invoke_data(chunk);
                }
                Ok(None) => {
                    tracing::debug!("📥 适配器 {} 对端关闭连接", self.id);
                    break;
                }
                Err(e) => return Err(AdapterError::from_read_io(&e)),
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.close_notified.swap(true, Ordering::AcqRel) {
            self.callbacks.invoke_close(false);
        }

        let transport = match &self.transport {
            Ok(transport) => transport,
            Err(_) => {
                self.running.store(false, Ordering::Release);
                *self.state.lock() = AdapterState::Closed;
                return Ok(());
            }
        };

        if transport.is_closed() {
            return Ok(());
        }

        *self.state.lock() = AdapterState::Closing;
        let result = transport.close();
        self.running.store(false, Ordering::Release);
        *self.state.lock() = AdapterState::Closed;

        match result {
            Ok(()) => {
                tracing::info!("🔗 适配器 {} 已关闭", self.id);
                Ok(())
            }
            Err(e) => {
                tracing::error!("🔗 适配器 {} 关闭失败: {}", self.id, e);
                self.stats.record_error();
                Err(e)
            }
        }
    }
}
