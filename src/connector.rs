/// CONNECT 握手
///
/// 连接到上游代理，发送 CONNECT 请求并解析响应头。只有 200 响应表示隧道建立，
/// 此后连接上的字节全部属于目标端，不再解析
use anyhow::Context;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::config::{TargetAddress, TunnelConfig};
use crate::error::ConnectError;
use crate::stream::TunnelStream;
use crate::transport::{create_dialer, ProxyDialer};

/// 响应头最大长度
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// 响应头最多解析的头部数量
///
/// 最短的头部行（`a:\r\n`）占 4 字节，长度上限内的响应头不会超出此数量
const MAX_RESPONSE_HEADERS: usize = MAX_RESPONSE_HEAD / 4;

/// 拒绝响应体最多读取的字节数
const MAX_REJECTION_BODY: usize = 64 * 1024;

/// 读取拒绝响应体的最长等待时间
const REJECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 构造 CONNECT 请求
pub fn build_connect_request(target: &TargetAddress, proxy_authorization: Option<&str>) -> String {
    let target = target.as_str();
    let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
    if let Some(auth) = proxy_authorization {
        request.push_str("Proxy-Authorization: ");
        request.push_str(auth);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// 已解析的响应头
#[derive(Debug)]
struct ResponseHead {
    status: u16,
    reason: String,
    content_length: Option<usize>,
}

/// 上游代理连接器
///
/// 所有会话共享同一个连接器，每次 `connect` 都新建一条代理连接
pub struct ProxyConnector {
    dialer: Arc<dyn ProxyDialer>,
    target: TargetAddress,
    proxy_authorization: Option<String>,
    handshake_timeout: Option<Duration>,
}

impl ProxyConnector {
    pub fn new(
        dialer: Arc<dyn ProxyDialer>,
        target: TargetAddress,
        proxy_authorization: Option<String>,
        handshake_timeout: Option<Duration>,
    ) -> Self {
        Self {
            dialer,
            target,
            proxy_authorization,
            handshake_timeout,
        }
    }

    /// 根据隧道配置创建连接器
    pub fn from_config(config: &TunnelConfig) -> anyhow::Result<Self> {
        let dialer = create_dialer(&config.proxy_url, &config.tls, config.timeouts.connect())
            .context("Failed to create proxy dialer")?;

        Ok(Self::new(
            dialer,
            config.target.clone(),
            config.proxy_url.proxy_authorization(),
            config.timeouts.handshake(),
        ))
    }

    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    pub fn proxy_addr(&self) -> &str {
        self.dialer.proxy_addr()
    }

    /// 建立一条到目标的隧道
    pub async fn connect(&self) -> Result<TunnelStream, ConnectError> {
        let mut stream = self.dialer.dial().await?;
        debug!(
            "Connected to {} proxy {}",
            self.dialer.scheme(),
            self.dialer.proxy_addr()
        );

        let handshake = self.handshake(&mut stream);
        let prebuffer = match self.handshake_timeout {
            Some(duration) => timeout(duration, handshake)
                .await
                .map_err(|_| ConnectError::HandshakeTimeout { duration })??,
            None => handshake.await?,
        };

        debug!(
            "CONNECT {} established ({} bytes prebuffered)",
            self.target,
            prebuffer.len()
        );
        Ok(TunnelStream::new(stream, prebuffer))
    }

    /// 在已建立的连接上完成 CONNECT 握手，返回响应头之后多读到的字节
    async fn handshake<S>(&self, stream: &mut S) -> Result<Bytes, ConnectError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = build_connect_request(&self.target, self.proxy_authorization.as_deref());
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(ConnectError::WriteFailed)?;
        stream.flush().await.map_err(ConnectError::WriteFailed)?;

        let (head, rest) = read_response_head(stream).await?;
        if head.status == 200 {
            return Ok(rest.freeze());
        }

        let body = read_rejection_body(stream, rest, head.content_length).await;
        debug!(
            "Proxy {} rejected CONNECT {}: {} {}",
            self.dialer.proxy_addr(),
            self.target,
            head.status,
            head.reason
        );
        Err(ConnectError::Rejected {
            status: head.status,
            reason: head.reason,
            body,
        })
    }
}

/// 读取并解析响应头，返回响应头和其后已读到的字节
async fn read_response_head<S>(stream: &mut S) -> Result<(ResponseHead, BytesMut), ConnectError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        let n = stream
            .read_buf(&mut buf)
            .await
            .map_err(|e| ConnectError::read_failed(e.to_string()))?;
        if n == 0 {
            return Err(ConnectError::read_failed(if buf.is_empty() {
                "proxy closed connection without response"
            } else {
                "proxy closed connection in the middle of response head"
            }));
        }

        let parsed = {
            let mut headers = vec![httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
            let mut response = httparse::Response::new(&mut headers);
            match response.parse(&buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let content_length = response
                        .headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
                        .and_then(|h| std::str::from_utf8(h.value).ok())
                        .and_then(|v| v.trim().parse::<usize>().ok());
                    Some((
                        head_len,
                        ResponseHead {
                            status: response.code.unwrap_or_default(),
                            reason: response.reason.unwrap_or_default().to_string(),
                            content_length,
                        },
                    ))
                }
                Ok(httparse::Status::Partial) => None,
                Err(e) => {
                    return Err(ConnectError::read_failed(format!(
                        "malformed response: {}",
                        e
                    )))
                }
            }
        };

        match parsed {
            Some((head_len, _)) if head_len > MAX_RESPONSE_HEAD => {
                return Err(ConnectError::read_failed(format!(
                    "response head exceeds {} bytes",
                    MAX_RESPONSE_HEAD
                )));
            }
            Some((head_len, head)) => {
                let rest = buf.split_off(head_len);
                return Ok((head, rest));
            }
            None if buf.len() >= MAX_RESPONSE_HEAD => {
                return Err(ConnectError::read_failed(format!(
                    "response head exceeds {} bytes",
                    MAX_RESPONSE_HEAD
                )));
            }
            None => {}
        }
    }
}

/// 尽力读取拒绝响应体，仅用于诊断
async fn read_rejection_body<S>(
    stream: &mut S,
    mut body: BytesMut,
    content_length: Option<usize>,
) -> Bytes
where
    S: AsyncRead + Unpin,
{
    let limit = content_length
        .unwrap_or(MAX_REJECTION_BODY)
        .min(MAX_REJECTION_BODY);

    let drain = async {
        while body.len() < limit {
            match stream.read_buf(&mut body).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if timeout(REJECTION_DRAIN_TIMEOUT, drain).await.is_err() {
        debug!("Rejection body not complete within {:?}", REJECTION_DRAIN_TIMEOUT);
    }

    body.truncate(limit);
    body.freeze()
}
