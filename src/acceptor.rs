/// 连接接收循环
///
/// 持有监听 socket，为每个入站连接分配会话 ID 并派发到独立任务。
/// 单个连接的失败不会影响接收循环
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TunnelError};

/// 接收出错后的退避时间
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// 监听器抽象
#[async_trait]
pub trait Accept: Send {
    type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Conn, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Accept for TcpListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }
        Ok((stream, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// 单个连接的处理逻辑
#[async_trait]
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    async fn handle(&self, id: u64, conn: C, peer: SocketAddr);
}

pub struct ConnectionAcceptor<L> {
    listener: L,
    limiter: Option<Arc<Semaphore>>,
    max_sessions: Option<usize>,
    next_id: u64,
}

impl ConnectionAcceptor<TcpListener> {
    /// 绑定监听地址，失败属于启动错误
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TunnelError::bind_failed(addr, e))?;
        Ok(Self::new(listener))
    }
}

impl<L: Accept> ConnectionAcceptor<L> {
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            limiter: None,
            max_sessions: None,
            next_id: 1,
        }
    }

    /// 设置最大并发会话数，`None` 表示不限制
    pub fn with_max_sessions(mut self, max_sessions: Option<usize>) -> Self {
        self.limiter = max_sessions.map(|n| Arc::new(Semaphore::new(n)));
        self.max_sessions = max_sessions;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 运行接收循环，直到收到关闭信号
    pub async fn serve<H>(
        mut self,
        handler: Arc<H>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        H: ConnectionHandler<L::Conn>,
    {
        if let Some(max) = self.max_sessions {
            info!("Maximum concurrent sessions: {}", max);
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((conn, peer)) => self.dispatch(&handler, conn, peer),
                        Err(e) => {
                            error!("Accept error: {}", e);
                            sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping listener...");
                    break;
                }
            }
        }

        Ok(())
    }

    fn dispatch<H>(&mut self, handler: &Arc<H>, conn: L::Conn, peer: SocketAddr)
    where
        H: ConnectionHandler<L::Conn>,
    {
        let permit = match &self.limiter {
            Some(limiter) => match limiter.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(
                        "Session limit reached ({}), rejecting connection from {}",
                        self.max_sessions.unwrap_or_default(),
                        peer
                    );
                    drop(conn);
                    return;
                }
            },
            None => None,
        };

        let id = self.next_id;
        self.next_id += 1;
        info!("Session {} ({}): accepted", id, peer);

        let handler = Arc::clone(handler);
        tokio::spawn(async move {
            // 持有 permit 直到会话结束
            let _permit = permit;
            handler.handle(id, conn, peer).await;
            debug!("Session {} ({}): task finished", id, peer);
        });
    }
}
