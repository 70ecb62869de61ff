mod factory;
#[cfg(test)]
pub(crate) mod mock;
mod tcp;
mod tls;

pub use factory::create_dialer;
pub use tcp::TcpDialer;
pub use tls::TlsDialer;

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ProxyScheme;
use crate::error::ConnectError;

/// 传输层连接抽象
///
/// 统一封装到上游代理的明文与 TLS 连接
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

// 为所有满足条件的类型自动实现 Transport
impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// 装箱后的传输层连接
pub type BoxedTransport = Pin<Box<dyn Transport>>;

/// 上游代理拨号接口
///
/// 每次调用建立一条新的连接，不复用、不重试
#[async_trait]
pub trait ProxyDialer: Send + Sync {
    /// 连接到代理，失败时返回 `ConnectError::ProxyUnreachable`
    async fn dial(&self) -> Result<BoxedTransport, ConnectError>;

    /// 代理协议
    fn scheme(&self) -> ProxyScheme;

    /// 代理地址（用于日志）
    fn proxy_addr(&self) -> &str;
}
