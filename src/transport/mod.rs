/// 传输层
///
/// 明文TCP或TLS包装的阻塞套接字，以及构造它们的工厂

pub mod connection;
pub mod factory;
pub mod tls;

pub use connection::{ConnectParams, Transport};
pub use factory::TransportFactory;
pub use tls::InsecureTrustAllVerifier;

pub(crate) use connection::Reader;
