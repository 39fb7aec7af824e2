/// TLS客户端上下文
///
/// 协议版本被限制为唯一一个；信任策略由 `TrustPolicy` 显式选择。

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, WebPkiSupportedAlgorithms},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme, SupportedProtocolVersion,
};
use std::sync::Arc;

use crate::config::{TlsConfig, TlsVersion, TrustPolicy};
use crate::error::AdapterError;

/// 不安全的信任策略：接受任意证书链与任意服务端身份
///
/// 不做证书链校验，也不做主机名校验；只校验握手签名，
/// 以确认对端持有其出示证书的私钥。
#[derive(Debug)]
pub struct InsecureTrustAllVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl InsecureTrustAllVerifier {
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for InsecureTrustAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

fn protocol_version(version: TlsVersion) -> &'static SupportedProtocolVersion {
    match version {
        TlsVersion::Tls12 => &rustls::version::TLS12,
        TlsVersion::Tls13 => &rustls::version::TLS13,
    }
}

fn root_store(policy: &TrustPolicy) -> crate::Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match policy {
        TrustPolicy::InsecureTrustAll => {}
        TrustPolicy::WebPkiRoots => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        TrustPolicy::CustomCa { ca_cert_pem } => {
            let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(ca_cert_pem.as_bytes()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AdapterError::construction_error(format!("Failed to parse CA certificate: {}", e)))?;
            if certs.is_empty() {
                return Err(AdapterError::construction_error("No CA certificate found in PEM input"));
            }
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| AdapterError::construction_error(format!("Failed to add CA certificate to store: {}", e)))?;
            }
        }
    }
    Ok(roots)
}

/// 根据TLS配置构建客户端上下文
pub fn build_client_config(tls: &TlsConfig) -> crate::Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[protocol_version(tls.version)])
        .map_err(|e| AdapterError::construction_error(format!("TLS context error: {}", e)))?;

    let config = match &tls.trust_policy {
        TrustPolicy::InsecureTrustAll => {
            tracing::warn!("[SECURITY] TLS客户端使用不安全模式（跳过证书与主机名校验）");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureTrustAllVerifier::new(&provider)))
                .with_no_client_auth()
        }
        policy => {
            tracing::debug!("[SECURITY] TLS客户端启用证书校验: {:?}", tls.version);
            builder
                .with_root_certificates(root_store(policy)?)
                .with_no_client_auth()
        }
    };

    Ok(Arc::new(config))
}
