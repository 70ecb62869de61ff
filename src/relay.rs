/// 双向数据转发
///
/// 客户端连接和隧道连接之间原样复制字节，每个方向一个任务。
/// 任一方向结束（EOF 或错误）即结束整个转发，另一方向被中止，两条连接随之关闭
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{debug, warn};

/// 默认复制缓冲区大小
pub const RELAY_BUFFER_SIZE: usize = 64 * 1024;

/// 转发选项
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// 单方向空闲超时，缺省不限制
    pub idle_timeout: Option<Duration>,
    pub buffer_size: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            buffer_size: RELAY_BUFFER_SIZE,
        }
    }
}

/// 数据方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTunnel,
    TunnelToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToTunnel => write!(f, "client->tunnel"),
            Direction::TunnelToClient => write!(f, "tunnel->client"),
        }
    }
}

/// 先结束的方向是如何结束的
#[derive(Debug)]
pub enum DirectionEnd {
    /// 读到 EOF，对端写方向已关闭
    Eof,
    /// 读写出错或空闲超时
    Failed(io::Error),
    /// 复制任务 panic 或被取消
    Crashed(String),
}

/// 转发结果
#[derive(Debug)]
pub struct RelayOutcome {
    pub first_closed: Direction,
    pub end: DirectionEnd,
    pub client_to_tunnel: u64,
    pub tunnel_to_client: u64,
}

impl RelayOutcome {
    /// 是否正常结束
    pub fn is_clean(&self) -> bool {
        matches!(self.end, DirectionEnd::Eof)
    }

    pub fn error(&self) -> Option<&io::Error> {
        match &self.end {
            DirectionEnd::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// 在两条连接之间双向转发，直到任一方向结束
pub async fn relay<C, T>(client: C, tunnel: T, options: &RelayOptions) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (tunnel_read, tunnel_write) = tokio::io::split(tunnel);

    let up = Arc::new(AtomicU64::new(0));
    let down = Arc::new(AtomicU64::new(0));

    let mut c2t = tokio::spawn(copy_direction(
        client_read,
        tunnel_write,
        Direction::ClientToTunnel,
        options.clone(),
        up.clone(),
    ));
    let mut t2c = tokio::spawn(copy_direction(
        tunnel_read,
        client_write,
        Direction::TunnelToClient,
        options.clone(),
        down.clone(),
    ));

    let (first_closed, joined) = tokio::select! {
        r = &mut c2t => {
            t2c.abort();
            let _ = t2c.await;
            (Direction::ClientToTunnel, r)
        }
        r = &mut t2c => {
            c2t.abort();
            let _ = c2t.await;
            (Direction::TunnelToClient, r)
        }
    };

    let end = match joined {
        Ok(Ok(())) => DirectionEnd::Eof,
        Ok(Err(e)) => DirectionEnd::Failed(e),
        Err(e) => {
            warn!("Relay task {} crashed: {}", first_closed, e);
            DirectionEnd::Crashed(join_error_message(e))
        }
    };

    RelayOutcome {
        first_closed,
        end,
        client_to_tunnel: up.load(Ordering::Relaxed),
        tunnel_to_client: down.load(Ordering::Relaxed),
    }
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        "copy task panicked".to_string()
    } else {
        "copy task cancelled".to_string()
    }
}

/// 单方向复制，读到 EOF 后关闭对端的写方向
async fn copy_direction<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    options: RelayOptions,
    counter: Arc<AtomicU64>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; options.buffer_size.max(1)];

    loop {
        let n = match options.idle_timeout {
            Some(duration) => timeout(duration, reader.read(&mut buf))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{} idle for {:?}", direction, duration),
                    )
                })??,
            None => reader.read(&mut buf).await?,
        };

        if n == 0 {
            break;
        }

        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown after {} EOF failed: {}", direction, e);
    }
    Ok(())
}
