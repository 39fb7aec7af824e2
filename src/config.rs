/// 适配器配置
///
/// 安全模式在构造时固定；超时与缓冲区大小对应单连接适配器的默认行为。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认连接超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// 连接建立后的默认读超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// 每次读取的最大字节数
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// 配置错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': {value} - {reason}. Suggestion: {suggestion}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
        suggestion: String,
    },

    #[error("Missing required field: {field}. {suggestion}")]
    MissingField {
        field: String,
        suggestion: String,
    },
}

/// 安全模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// 明文TCP
    Plain,
    /// TLS 包装的TCP
    #[default]
    Tls,
}

impl SecurityMode {
    /// 与宿主侧 `useSSL` 布尔参数对应
    pub fn from_use_ssl(use_ssl: bool) -> Self {
        if use_ssl {
            SecurityMode::Tls
        } else {
            SecurityMode::Plain
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, SecurityMode::Tls)
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityMode::Plain => f.write_str("plain"),
            SecurityMode::Tls => f.write_str("tls"),
        }
    }
}

/// 协商的唯一TLS版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVersion {
    #[default]
    Tls12,
    Tls13,
}

/// 服务端证书信任策略
///
/// 默认值 `InsecureTrustAll` 不校验证书链也不校验主机名，
/// 用于连接自签名或无法校验证书的端点。需要真实校验时请显式选择其他策略。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum TrustPolicy {
    /// 接受任意证书链与任意服务端身份（不安全）
    #[default]
    InsecureTrustAll,
    /// 使用 webpki 内置根证书校验
    WebPkiRoots,
    /// 使用自定义CA证书（PEM）校验
    CustomCa { ca_cert_pem: String },
}

impl TrustPolicy {
    pub fn is_insecure(&self) -> bool {
        matches!(self, TrustPolicy::InsecureTrustAll)
    }
}

/// TLS配置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// 信任策略
    pub trust_policy: TrustPolicy,
    /// 协议版本
    pub version: TlsVersion,
    /// SNI / 证书校验使用的服务器名（默认取连接主机名）
    pub server_name: Option<String>,
}

impl TlsConfig {
    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    pub fn with_version(mut self, version: TlsVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// 适配器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// 安全模式，构造后不可更改
    pub security: SecurityMode,
    /// 连接超时时间
    pub connect_timeout: Duration,
    /// 连接建立前设置的读超时
    pub read_timeout: Duration,
    /// 单次读取缓冲区大小
    pub read_buffer_size: usize,
    /// TLS配置（明文模式下忽略）
    pub tls: TlsConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            security: SecurityMode::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            tls: TlsConfig::default(),
        }
    }
}

impl AdapterConfig {
    pub fn new(security: SecurityMode) -> Self {
        Self {
            security,
            ..Self::default()
        }
    }

    /// 明文预设
    pub fn plain() -> Self {
        Self::new(SecurityMode::Plain)
    }

    /// TLS预设，信任任意证书（不安全）
    pub fn tls_insecure() -> Self {
        Self::new(SecurityMode::Tls)
    }

    /// TLS预设，使用 webpki 根证书校验
    pub fn tls_verified() -> Self {
        Self::new(SecurityMode::Tls)
            .with_tls(TlsConfig::default().with_trust_policy(TrustPolicy::WebPkiRoots))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout".to_string(),
                value: format!("{:?}", self.connect_timeout),
                reason: "must be > 0".to_string(),
                suggestion: "use a bounded timeout such as 5s".to_string(),
            });
        }

        if self.read_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "read_timeout".to_string(),
                value: format!("{:?}", self.read_timeout),
                reason: "must be > 0".to_string(),
                suggestion: "use a bounded timeout such as 60s".to_string(),
            });
        }

        if self.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "read_buffer_size".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
                suggestion: "set a positive value".to_string(),
            });
        }

        if self.security.is_tls() {
            if let TrustPolicy::CustomCa { ca_cert_pem } = &self.tls.trust_policy {
                if ca_cert_pem.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "tls.trust_policy.ca_cert_pem".to_string(),
                        suggestion: "provide a PEM encoded CA certificate".to_string(),
                    });
                }
            }
            if matches!(&self.tls.server_name, Some(name) if name.is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "tls.server_name".to_string(),
                    value: "\"\"".to_string(),
                    reason: "must not be empty".to_string(),
                    suggestion: "remove the field to use the connection host".to_string(),
                });
            }
        }

        Ok(())
    }
}
