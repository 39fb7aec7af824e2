use std::io;

/// 错误分类
///
/// 决定错误通过哪条路径上报：构造与连接错误走 open-error 回调，
/// 读取与其后的关闭错误走 error 回调，其余错误直接返回给调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// TLS 上下文构造失败
    Construction,
    /// 连接失败（超时、拒绝、DNS）
    Connect,
    /// 连接建立后的读取失败
    Read,
    /// 释放传输层失败
    Close,
    /// 套接字选项无效或无法应用
    Option,
    /// 直接写入或半关闭失败
    Write,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Construction => "construction",
            ErrorKind::Connect => "connect",
            ErrorKind::Read => "read",
            ErrorKind::Close => "close",
            ErrorKind::Option => "option",
            ErrorKind::Write => "write",
        };
        f.write_str(name)
    }
}

/// 统一适配器错误类型
///
/// 底层 io / rustls 错误只以文本形式保留，不进入公共契约。
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// TLS 上下文或传输句柄构造失败
    #[error("{reason}")]
    Construction { reason: String },

    /// 连接相关错误
    #[error("{reason}")]
    Connect {
        reason: String,
        retryable: bool,
    },

    /// 读循环中的流错误
    #[error("{reason}")]
    Read {
        reason: String,
        timed_out: bool,
    },

    /// 关闭传输层失败
    #[error("{reason}")]
    Close { reason: String },

    /// 选项应用失败
    #[error("Invalid value for option '{option}': {reason}")]
    Option {
        option: &'static str,
        reason: String,
    },

    /// 套接字已关闭或不可用，选项无处应用
    #[error("Cannot apply socket options: {reason}")]
    OptionUnavailable { reason: String },

    /// 写入 / 半关闭失败
    #[error("{reason}")]
    Write {
        reason: String,
        not_connected: bool,
    },
}

impl AdapterError {
    /// 获取错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Construction { .. } => ErrorKind::Construction,
            AdapterError::Connect { .. } => ErrorKind::Connect,
            AdapterError::Read { .. } => ErrorKind::Read,
            AdapterError::Close { .. } => ErrorKind::Close,
            AdapterError::Option { .. } | AdapterError::OptionUnavailable { .. } => ErrorKind::Option,
            AdapterError::Write { .. } => ErrorKind::Write,
        }
    }

    /// 回调中传递的错误消息
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// 判断错误是否可重试（需要新的适配器实例）
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Connect { retryable, .. } => *retryable,
            AdapterError::Read { timed_out, .. } => *timed_out,
            AdapterError::Construction { .. } => false,
            AdapterError::Close { .. } => false,
            AdapterError::Option { .. } | AdapterError::OptionUnavailable { .. } => false,
            AdapterError::Write { .. } => false,
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> &'static str {
        match self {
            AdapterError::Construction { .. } => "CONSTRUCTION_ERROR",
            AdapterError::Connect { .. } => "CONNECT_ERROR",
            AdapterError::Read { .. } => "READ_ERROR",
            AdapterError::Close { .. } => "CLOSE_ERROR",
            AdapterError::Option { .. } | AdapterError::OptionUnavailable { .. } => "OPTION_ERROR",
            AdapterError::Write { .. } => "WRITE_ERROR",
        }
    }
}

/// 便利构造函数
impl AdapterError {
    pub fn construction_error(reason: impl Into<String>) -> Self {
        Self::Construction { reason: reason.into() }
    }

    pub fn connect_error(reason: impl Into<String>, retryable: bool) -> Self {
        Self::Connect {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn option_error(option: &'static str, reason: impl Into<String>) -> Self {
        Self::Option {
            option,
            reason: reason.into(),
        }
    }

    pub fn options_unavailable(reason: impl Into<String>) -> Self {
        Self::OptionUnavailable { reason: reason.into() }
    }

    pub fn close_error(reason: impl Into<String>) -> Self {
        Self::Close { reason: reason.into() }
    }

    pub fn not_connected() -> Self {
        Self::Write {
            reason: "Socket is not connected".to_string(),
            not_connected: true,
        }
    }

    /// 从连接阶段的IO错误转换
    pub fn from_connect_io(error: &io::Error) -> Self {
        let retryable = matches!(
            error.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted
        );
        Self::connect_error(error.to_string(), retryable)
    }

    /// 从读循环的IO错误转换
    pub fn from_read_io(error: &io::Error) -> Self {
        // SO_RCVTIMEO 超时在 unix 上表现为 WouldBlock
        let timed_out = matches!(
            error.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        );
        let reason = if timed_out {
            "Read timed out".to_string()
        } else {
            error.to_string()
        };
        Self::Read { reason, timed_out }
    }

    /// 从写入路径的IO错误转换
    pub fn from_write_io(error: &io::Error) -> Self {
        Self::Write {
            reason: error.to_string(),
            not_connected: error.kind() == io::ErrorKind::NotConnected,
        }
    }

    pub fn from_close_io(error: &io::Error) -> Self {
        Self::close_error(error.to_string())
    }
}
