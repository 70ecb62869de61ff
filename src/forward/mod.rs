// 转发模式 - 本地 HTTP 服务，把每个请求经上游代理转发到固定源站

mod headers;
mod service;

pub use headers::{copy_request_headers, copy_response_headers, is_hop_by_hop, rewrite_url};
pub use service::{ForwardBody, ForwardService};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::acceptor::{ConnectionAcceptor, ConnectionHandler};
use crate::config::ForwardConfig;

/// 在每个连接上提供 HTTP/1.1 服务
pub struct ForwardHandler {
    service: Arc<ForwardService>,
}

impl ForwardHandler {
    pub fn new(service: Arc<ForwardService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<C> ConnectionHandler<C> for ForwardHandler
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn handle(&self, id: u64, conn: C, peer: SocketAddr) {
        let service = self.service.clone();
        let svc = service_fn(move |req| {
            let service = service.clone();
            async move { Ok::<_, Infallible>(service.forward(req).await) }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(conn), svc)
            .await
        {
            debug!("Session {} ({}): HTTP connection error: {}", id, peer, e);
        }
    }
}

/// 已绑定端口的转发服务
pub struct ForwardServer {
    acceptor: ConnectionAcceptor<TcpListener>,
    handler: Arc<ForwardHandler>,
}

impl ForwardServer {
    pub async fn bind(config: &ForwardConfig) -> Result<Self> {
        config.validate()?;

        let service = Arc::new(ForwardService::new(config)?);
        let listen_addr = config.listen_socket_addr();
        let acceptor = ConnectionAcceptor::bind(&listen_addr).await?;

        let local_addr = acceptor
            .local_addr()
            .with_context(|| format!("Failed to get local address of {}", listen_addr))?;
        info!(
            "Forwarding http://{} to {} via proxy {}",
            local_addr,
            config.target_url,
            config.proxy_url.url_without_credentials()
        );

        Ok(Self {
            acceptor,
            handler: Arc::new(ForwardHandler::new(service)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.acceptor.local_addr()?)
    }

    pub async fn serve(self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.acceptor.serve(self.handler, shutdown_rx).await?;
        info!("Forwarder stopped");
        Ok(())
    }
}

/// 运行转发模式直到收到关闭信号
pub async fn run_forward(config: ForwardConfig, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    ForwardServer::bind(&config).await?.serve(shutdown_rx).await
}
