use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{BoxedTransport, ProxyDialer};
use crate::config::ProxyScheme;
use crate::error::ConnectError;

/// 代理连接的 TCP keepalive 首次探测时间
const KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// 代理连接的 TCP keepalive 探测间隔
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// 明文 TCP 拨号器
pub struct TcpDialer {
    addr: String,
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>, connect_timeout: Option<Duration>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    /// 建立 TCP 连接并设置 socket 选项
    pub async fn connect_tcp(&self) -> Result<TcpStream, ConnectError> {
        let connect = TcpStream::connect(&self.addr);
        let stream = match self.connect_timeout {
            Some(duration) => timeout(duration, connect).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timeout after {:?}", duration),
                )
            }),
            None => Ok(connect.await),
        }
        .and_then(|r| r)
        .map_err(|e| ConnectError::unreachable(&self.addr, e))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on proxy connection: {}", e);
        }

        let keepalive = TcpKeepalive::new()
            .with_time(KEEPALIVE_TIME)
            .with_interval(KEEPALIVE_INTERVAL);
        if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on proxy connection: {}", e);
        }

        debug!("TCP connection established to proxy {}", self.addr);
        Ok(stream)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ProxyDialer for TcpDialer {
    async fn dial(&self) -> Result<BoxedTransport, ConnectError> {
        let stream = self.connect_tcp().await?;
        Ok(Box::pin(stream))
    }

    fn scheme(&self) -> ProxyScheme {
        ProxyScheme::Http
    }

    fn proxy_addr(&self) -> &str {
        &self.addr
    }
}
