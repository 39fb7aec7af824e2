/// 套接字选项
///
/// 每个字段独立可选，缺省字段保持传输层默认值。

use serde::{Deserialize, Serialize};
use socket2::SockRef;
use std::time::Duration;

use crate::error::AdapterError;
use crate::Result;

/// 连接选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// SO_KEEPALIVE
    pub keep_alive: Option<bool>,
    /// SO_OOBINLINE
    pub oob_inline: Option<bool>,
    /// SO_LINGER（秒），设置即启用
    pub so_linger: Option<u32>,
    /// 读超时（毫秒），0 表示无限等待
    pub so_timeout: Option<u64>,
    /// SO_RCVBUF（字节）
    pub receive_buffer_size: Option<usize>,
    /// SO_SNDBUF（字节）
    pub send_buffer_size: Option<usize>,
    /// IP_TOS
    pub traffic_class: Option<u32>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = Some(enabled);
        self
    }

    pub fn with_oob_inline(mut self, enabled: bool) -> Self {
        self.oob_inline = Some(enabled);
        self
    }

    pub fn with_so_linger(mut self, seconds: u32) -> Self {
        self.so_linger = Some(seconds);
        self
    }

    pub fn with_so_timeout(mut self, millis: u64) -> Self {
        self.so_timeout = Some(millis);
        self
    }

    pub fn with_receive_buffer_size(mut self, bytes: usize) -> Self {
        self.receive_buffer_size = Some(bytes);
        self
    }

    pub fn with_send_buffer_size(mut self, bytes: usize) -> Self {
        self.send_buffer_size = Some(bytes);
        self
    }

    pub fn with_traffic_class(mut self, class: u32) -> Self {
        self.traffic_class = Some(class);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 合并选项，`other` 中存在的字段覆盖当前值
    pub fn merge(mut self, other: &ConnectionOptions) -> Self {
        if other.keep_alive.is_some() {
            self.keep_alive = other.keep_alive;
        }
        if other.oob_inline.is_some() {
            self.oob_inline = other.oob_inline;
        }
        if other.so_linger.is_some() {
            self.so_linger = other.so_linger;
        }
        if other.so_timeout.is_some() {
            self.so_timeout = other.so_timeout;
        }
        if other.receive_buffer_size.is_some() {
            self.receive_buffer_size = other.receive_buffer_size;
        }
        if other.send_buffer_size.is_some() {
            self.send_buffer_size = other.send_buffer_size;
        }
        if other.traffic_class.is_some() {
            self.traffic_class = other.traffic_class;
        }
        self
    }
}

/// 选项应用器
///
/// 按固定顺序应用：keep_alive, oob_inline, so_linger, so_timeout,
/// receive_buffer_size, send_buffer_size, traffic_class。
/// 第一个失败即中止，已应用的字段不回滚。
pub struct OptionsApplier;

impl OptionsApplier {
    pub fn apply(socket: SockRef<'_>, options: &ConnectionOptions) -> Result<()> {
        if let Some(keep_alive) = options.keep_alive {
            socket
                .set_keepalive(keep_alive)
                .map_err(|e| Self::setter_failed("keep_alive", e))?;
        }
        if let Some(oob_inline) = options.oob_inline {
            socket
                .set_out_of_band_inline(oob_inline)
                .map_err(|e| Self::setter_failed("oob_inline", e))?;
        }
        if let Some(seconds) = options.so_linger {
            socket
                .set_linger(Some(Duration::from_secs(u64::from(seconds))))
                .map_err(|e| Self::setter_failed("so_linger", e))?;
        }
        if let Some(millis) = options.so_timeout {
            socket
                .set_read_timeout(Self::read_timeout(millis))
                .map_err(|e| Self::setter_failed("so_timeout", e))?;
        }
        if let Some(size) = options.receive_buffer_size {
            if size == 0 {
                return Err(AdapterError::option_error("receive_buffer_size", "must be > 0"));
            }
            socket
                .set_recv_buffer_size(size)
                .map_err(|e| Self::setter_failed("receive_buffer_size", e))?;
        }
        if let Some(size) = options.send_buffer_size {
            if size == 0 {
                return Err(AdapterError::option_error("send_buffer_size", "must be > 0"));
            }
            socket
                .set_send_buffer_size(size)
                .map_err(|e| Self::setter_failed("send_buffer_size", e))?;
        }
        if let Some(class) = options.traffic_class {
            if class > 255 {
                return Err(AdapterError::option_error("traffic_class", "must be in 0..=255"));
            }
            socket
                .set_tos(class)
                .map_err(|e| Self::setter_failed("traffic_class", e))?;
        }

        Ok(())
    }

    /// so_timeout 为 0 时表示无限等待
    pub fn read_timeout(millis: u64) -> Option<Duration> {
        if millis == 0 {
            None
        } else {
            Some(Duration::from_millis(millis))
        }
    }

    fn setter_failed(option: &'static str, error: std::io::Error) -> AdapterError {
        tracing::error!("⚙️ 设置套接字选项 {} 失败: {}", option, error);
        AdapterError::option_error(option, error.to_string())
    }
}
