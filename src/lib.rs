/// socketbridge - 单连接TCP/TLS套接字适配器
///
/// 把阻塞的系统套接字桥接到事件驱动的调用方：open / open-error / data / close / error
/// 五类回调，每个适配器一个串行工作器负责连接与读循环。

// 核心适配器
pub mod adapter;
pub mod callbacks;
pub mod worker;

// 传输层
pub mod transport;
pub mod options;

// 核心类型
pub mod config;
pub mod error;
pub mod state;
pub mod stats;

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(1);

/// 适配器ID的类型安全包装器，进程内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(u64);

impl AdapterId {
    /// 创建新的适配器ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// 分配下一个全局唯一ID
    pub fn next() -> Self {
        Self(NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// 获取原始ID值
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "adapter-{}", self.0)
    }
}

impl From<u64> for AdapterId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// 重新导出核心类型
pub use adapter::SocketAdapter;
pub use callbacks::{CallbackTable, EventKind};
pub use config::{AdapterConfig, ConfigError, SecurityMode, TlsConfig, TlsVersion, TrustPolicy};
pub use error::{AdapterError, ErrorKind};
pub use options::{ConnectionOptions, OptionsApplier};
pub use state::AdapterState;
pub use stats::AdapterStats;
pub use transport::{InsecureTrustAllVerifier, Transport, TransportFactory};
pub use worker::Worker;

// 便捷的类型别名
pub type Result<T> = std::result::Result<T, AdapterError>;
