use crate::config::{AdapterConfig, SecurityMode};
use crate::error::AdapterError;
use crate::transport::{tls, Transport};
use crate::Result;

/// 传输句柄工厂
///
/// 返回的句柄尚未连接。构造失败（TLS 上下文、CA 证书、配置校验）
/// 在这里记录日志，由适配器在 `open` 时通过 open-error 回调上报。
pub struct TransportFactory;

impl TransportFactory {
    pub fn create(config: &AdapterConfig) -> Result<Transport> {
        Self::build(config).map_err(|e| {
            tracing::error!("❌ 创建{}传输层失败: {}", config.security, e);
            e
        })
    }

    fn build(config: &AdapterConfig) -> Result<Transport> {
        config
            .validate()
            .map_err(|e| AdapterError::construction_error(e.to_string()))?;

        match config.security {
            SecurityMode::Plain => Ok(Transport::plain()),
            SecurityMode::Tls => {
                let client_config = tls::build_client_config(&config.tls)?;
                Ok(Transport::tls(client_config, config.tls.server_name.clone()))
            }
        }
    }
}
