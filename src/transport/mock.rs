// 测试用拨号器：返回预先准备好的内存连接

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use super::{BoxedTransport, ProxyDialer};
use crate::config::ProxyScheme;
use crate::error::ConnectError;

/// 每次 dial 按顺序取出一条预置连接，取完后返回不可达错误
pub struct DuplexDialer {
    streams: Mutex<VecDeque<DuplexStream>>,
    closed: Arc<AtomicUsize>,
}

impl DuplexDialer {
    pub fn new(streams: Vec<DuplexStream>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 单条连接，返回拨号器和代理侧的对端
    pub fn pair() -> (Self, DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        (Self::new(vec![local]), remote)
    }

    /// 已被释放的代理连接数量
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyDialer for DuplexDialer {
    async fn dial(&self) -> Result<BoxedTransport, ConnectError> {
        let stream = self.streams.lock().unwrap().pop_front().ok_or_else(|| {
            ConnectError::unreachable(
                "mock-proxy:3128",
                io::Error::new(io::ErrorKind::ConnectionRefused, "no stream left"),
            )
        })?;
        Ok(Box::pin(DropCounted {
            inner: stream,
            closed: self.closed.clone(),
        }))
    }

    fn scheme(&self) -> ProxyScheme {
        ProxyScheme::Http
    }

    fn proxy_addr(&self) -> &str {
        "mock-proxy:3128"
    }
}

/// 释放时计数的连接
struct DropCounted {
    inner: DuplexStream,
    closed: Arc<AtomicUsize>,
}

impl Drop for DropCounted {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for DropCounted {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for DropCounted {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
