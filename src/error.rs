/// 自定义错误类型
///
/// 使用 thiserror 定义精确的错误类型，会话和监听循环据此对失败进行分类
use bytes::Bytes;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// CONNECT 握手阶段的错误
///
/// 仅影响单个会话，不会传播到监听循环
#[derive(Error, Debug)]
pub enum ConnectError {
    /// 无法连接到上游代理（TCP 或 TLS 握手失败）
    #[error("Failed to reach proxy {addr}: {source}")]
    ProxyUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 写入 CONNECT 请求失败
    #[error("Failed to write CONNECT request: {0}")]
    WriteFailed(#[source] io::Error),

    /// 读取或解析代理响应失败
    #[error("Failed to read CONNECT response: {0}")]
    ReadFailed(String),

    /// 代理返回非 200 状态码
    #[error("Proxy rejected CONNECT: {status} {reason}")]
    Rejected {
        status: u16,
        reason: String,
        body: Bytes,
    },

    /// 握手超时
    #[error("CONNECT handshake timeout after {duration:?}")]
    HandshakeTimeout { duration: Duration },
}

impl ConnectError {
    /// 创建代理不可达错误
    pub fn unreachable(addr: impl Into<String>, source: io::Error) -> Self {
        Self::ProxyUnreachable {
            addr: addr.into(),
            source,
        }
    }

    /// 创建读取失败错误
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// 检查是否为代理拒绝
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// 检查是否为代理不可达
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::ProxyUnreachable { .. })
    }

    /// 代理拒绝时的状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 代理拒绝时返回的响应体（仅用于诊断）
    pub fn rejection_body(&self) -> Option<&[u8]> {
        match self {
            Self::Rejected { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// 隧道的主要错误类型
#[derive(Error, Debug)]
pub enum TunnelError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 监听地址绑定失败
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// CONNECT 握手失败
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 其他错误（保留与 anyhow 的兼容性）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 创建绑定失败错误
    pub fn bind_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::BindFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }

    /// 检查是否为启动阶段的致命错误
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::BindFailed { .. })
    }

    /// 获取握手错误（如果有）
    pub fn as_connect_error(&self) -> Option<&ConnectError> {
        match self {
            Self::Connect(e) => Some(e),
            _ => None,
        }
    }
}
