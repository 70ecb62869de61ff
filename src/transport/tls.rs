use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::io;
use std::time::Duration;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::{BoxedTransport, ProxyDialer, TcpDialer};
use crate::config::ProxyScheme;
use crate::error::ConnectError;

/// TLS 拨号器：先建立 TCP 连接，再与代理完成 TLS 握手
pub struct TlsDialer {
    tcp: TcpDialer,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    connect_timeout: Option<Duration>,
}

impl TlsDialer {
    pub fn new(
        addr: impl Into<String>,
        server_name: &str,
        connector: TlsConnector,
        connect_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| anyhow::anyhow!("Invalid proxy server name '{}': {}", server_name, e))?;

        Ok(Self {
            tcp: TcpDialer::new(addr, connect_timeout),
            server_name,
            connector,
            connect_timeout,
        })
    }
}

#[async_trait]
impl ProxyDialer for TlsDialer {
    async fn dial(&self) -> Result<BoxedTransport, ConnectError> {
        let tcp_stream = self.tcp.connect_tcp().await?;

        let handshake = self.connector.connect(self.server_name.clone(), tcp_stream);
        let tls_stream = match self.connect_timeout {
            Some(duration) => timeout(duration, handshake).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("TLS handshake timeout after {:?}", duration),
                )
            }),
            None => Ok(handshake.await),
        }
        .and_then(|r| r)
        .map_err(|e| ConnectError::unreachable(self.tcp.addr(), e))?;

        debug!("TLS connection established to proxy {}", self.tcp.addr());
        Ok(Box::pin(tls_stream))
    }

    fn scheme(&self) -> ProxyScheme {
        ProxyScheme::Https
    }

    fn proxy_addr(&self) -> &str {
        self.tcp.addr()
    }
}
