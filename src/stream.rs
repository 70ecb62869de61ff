/// 隧道连接
///
/// CONNECT 握手完成后的代理连接。读取代理响应头时可能一并收到了目标端
/// 发来的首批数据（例如 MySQL 的握手包），这部分字节不做任何解析，
/// 在后续读取时原样先返回
use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::transport::BoxedTransport;

pub struct TunnelStream<S = BoxedTransport> {
    inner: S,
    prebuffer: Bytes,
}

impl<S> TunnelStream<S> {
    pub fn new(inner: S, prebuffer: Bytes) -> Self {
        Self { inner, prebuffer }
    }

    /// 尚未被读取的预读字节
    pub fn prebuffered(&self) -> &[u8] {
        &self.prebuffer
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// 拆分为预读字节和底层连接
    pub fn into_parts(self) -> (Bytes, S) {
        (self.prebuffer, self.inner)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TunnelStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if !self.prebuffer.is_empty() {
            let n = self.prebuffer.len().min(buf.remaining());
            buf.put_slice(&self.prebuffer[..n]);
            self.prebuffer.advance(n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TunnelStream<S> {
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

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
