//! Common utilities for integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

/// 测试的默认超时
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 代理收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

/// 模拟代理的行为
#[derive(Debug, Clone)]
pub enum ProxyBehavior {
    /// 连接请求中的目标并转发
    Tunnel,
    /// 返回给定的状态行和响应体
    Reject { status_line: String, body: String },
    /// 读完请求后直接关闭连接
    Hangup,
}

/// Create a simple echo server for testing
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// 连接建立后先发送问候数据的目标（类似 MySQL），然后回显
pub async fn start_greeting_server(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if socket.write_all(greeting).await.is_err() {
                    return;
                }
                let mut buf = vec![0u8; 8192];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// 发送一段数据后立即关闭的目标
pub async fn start_send_and_close_server(payload: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(payload).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

/// 读取 HTTP 请求头（到空行为止）
pub async fn read_request_head<S>(stream: &mut S) -> Option<RecordedRequest>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
    }

    let text = String::from_utf8_lossy(&head).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers = lines
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    Some(RecordedRequest {
        request_line,
        headers,
        body: Vec::new(),
    })
}

/// 按 Content-Length 或 chunked 编码读取请求体
pub async fn read_request_body<S>(stream: &mut S, request: &mut RecordedRequest)
where
    S: AsyncRead + Unpin,
{
    if let Some(len) = request
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
    {
        let mut body = vec![0u8; len];
        if stream.read_exact(&mut body).await.is_ok() {
            request.body = body;
        }
        return;
    }

    let chunked = request
        .header("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    if !chunked {
        return;
    }

    loop {
        let mut size_line = Vec::new();
        let mut byte = [0u8; 1];
        while !size_line.ends_with(b"\r\n") {
            if stream.read(&mut byte).await.unwrap_or(0) == 0 {
                return;
            }
            size_line.push(byte[0]);
        }
        let size_text = String::from_utf8_lossy(&size_line[..size_line.len() - 2]).into_owned();
        let size = usize::from_str_radix(size_text.trim(), 16).unwrap_or(0);

        let mut chunk = vec![0u8; size + 2];
        if stream.read_exact(&mut chunk).await.is_err() {
            return;
        }
        if size == 0 {
            return;
        }
        request.body.extend_from_slice(&chunk[..size]);
    }
}

async fn handle_proxy_connection<S>(
    mut client: S,
    behavior: ProxyBehavior,
    required_auth: Option<String>,
    log: RequestLog,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(request) = read_request_head(&mut client).await else {
        return;
    };
    log.lock().unwrap().push(request.clone());

    if let Some(expected) = required_auth {
        if request.header("proxy-authorization") != Some(expected.as_str()) {
            let _ = client
                .write_all(
                    b"HTTP/1.1 407 Proxy Authentication Required\r\n\
                      Proxy-Authenticate: Basic realm=\"test\"\r\n\
                      Content-Length: 13\r\n\r\nauth required",
                )
                .await;
            return;
        }
    }

    match behavior {
        ProxyBehavior::Tunnel => {
            let target = request
                .request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            let mut upstream = match TcpStream::connect(&target).await {
                Ok(s) => s,
                Err(_) => {
                    let _ = client
                        .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
                        .await;
                    return;
                }
            };
            if client
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .is_err()
            {
                return;
            }
            let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
        }
        ProxyBehavior::Reject { status_line, body } => {
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = client.write_all(response.as_bytes()).await;
        }
        ProxyBehavior::Hangup => {}
    }
}

/// 启动模拟 CONNECT 代理，返回地址和请求记录
pub async fn start_connect_proxy(
    behavior: ProxyBehavior,
    required_auth: Option<&str>,
    tls: Option<TlsAcceptor>,
) -> (SocketAddr, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock proxy");
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let required_auth = required_auth.map(String::from);

    let log_clone = log.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let behavior = behavior.clone();
            let required_auth = required_auth.clone();
            let log = log_clone.clone();
            let tls = tls.clone();
            tokio::spawn(async move {
                match tls {
                    Some(acceptor) => {
                        if let Ok(stream) = acceptor.accept(socket).await {
                            handle_proxy_connection(stream, behavior, required_auth, log).await;
                        }
                    }
                    None => handle_proxy_connection(socket, behavior, required_auth, log).await,
                }
            });
        }
    });

    (addr, log)
}

/// 生成自签名证书的 TLS 服务端配置
pub fn self_signed_acceptor() -> TlsAcceptor {
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .expect("Failed to generate self-signed certificate");

    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.signing_key.serialize_der(),
    ));

    let config = rustls::ServerConfig::builder_with_provider(proxy_tunnel::tls::crypto_provider())
        .with_safe_default_protocol_versions()
        .expect("Failed to select protocol versions")
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .expect("Failed to build server config");

    TlsAcceptor::from(Arc::new(config))
}

/// 发送数据并读取等长的回应
pub async fn send_and_receive(stream: &mut TcpStream, data: &[u8]) -> Vec<u8> {
    stream.write_all(data).await.unwrap();
    let mut buf = vec![0u8; data.len()];
    timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("Timeout waiting for echo")
        .unwrap();
    buf
}

/// 读到 EOF 为止
pub async fn read_until_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    timeout(TEST_TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .expect("Timeout waiting for EOF")
        .unwrap_or_default();
    buf
}

/// 关闭信号通道
pub fn shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(1)
}
