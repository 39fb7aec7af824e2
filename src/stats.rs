use std::sync::atomic::{AtomicU64, Ordering};

/// 适配器统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// 写入次数
    pub writes: u64,
    /// 发送的字节数
    pub bytes_sent: u64,
    /// 数据回调次数
    pub chunks_received: u64,
    /// 接收的字节数
    pub bytes_received: u64,
    /// 错误计数
    pub errors: u64,
}

/// 无锁计数器，读循环与调用方线程同时更新
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    writes: AtomicU64,
    bytes_sent: AtomicU64,
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    errors: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_write(&self, size: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_chunk(&self, size: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AdapterStats {
        AdapterStats {
            writes: self.writes.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
