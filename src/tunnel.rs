// 隧道模式入口 - 监听本地端口，每个连接通过代理建立到固定目标的隧道

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::acceptor::{ConnectionAcceptor, ConnectionHandler};
use crate::config::TunnelConfig;
use crate::connector::ProxyConnector;
use crate::relay::RelayOptions;
use crate::session::TunnelSession;

/// 为每个连接运行一个隧道会话
pub struct TunnelHandler {
    connector: Arc<ProxyConnector>,
    relay_options: RelayOptions,
}

impl TunnelHandler {
    pub fn new(connector: Arc<ProxyConnector>, relay_options: RelayOptions) -> Self {
        Self {
            connector,
            relay_options,
        }
    }
}

#[async_trait]
impl<C> ConnectionHandler<C> for TunnelHandler
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn handle(&self, id: u64, conn: C, peer: SocketAddr) {
        let session = TunnelSession::new(
            id,
            peer,
            conn,
            self.connector.clone(),
            self.relay_options.clone(),
        );
        session.run().await;
    }
}

/// 已绑定端口、尚未开始接收连接的隧道服务
pub struct TunnelServer {
    acceptor: ConnectionAcceptor<TcpListener>,
    handler: Arc<TunnelHandler>,
}

impl TunnelServer {
    pub async fn bind(config: &TunnelConfig) -> Result<Self> {
        config.validate()?;

        let connector = Arc::new(ProxyConnector::from_config(config)?);
        let listen_addr = config.listen_socket_addr();
        let acceptor = ConnectionAcceptor::bind(&listen_addr)
            .await?
            .with_max_sessions(config.max_sessions);

        let local_addr = acceptor
            .local_addr()
            .with_context(|| format!("Failed to get local address of {}", listen_addr))?;
        info!(
            "Tunnel listening on {}, forwarding to {} via proxy {}",
            local_addr,
            config.target,
            config.proxy_url.url_without_credentials()
        );

        let relay_options = RelayOptions {
            idle_timeout: config.timeouts.idle(),
            ..RelayOptions::default()
        };

        Ok(Self {
            acceptor,
            handler: Arc::new(TunnelHandler::new(connector, relay_options)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.acceptor.local_addr()?)
    }

    pub async fn serve(self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.acceptor.serve(self.handler, shutdown_rx).await?;
        info!("Tunnel stopped");
        Ok(())
    }
}

/// 运行隧道模式直到收到关闭信号
pub async fn run_tunnel(config: TunnelConfig, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    TunnelServer::bind(&config).await?.serve(shutdown_rx).await
}
