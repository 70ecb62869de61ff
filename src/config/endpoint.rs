use base64::{engine::general_purpose, Engine as _};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::TunnelError;

/// 上游代理协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    /// 明文 TCP
    Http,
    /// TLS 加密连接
    Https,
}

impl ProxyScheme {
    /// 协议默认端口
    pub fn default_port(self) -> u16 {
        match self {
            ProxyScheme::Http => 80,
            ProxyScheme::Https => 443,
        }
    }

    /// 是否需要 TLS
    pub fn is_tls(self) -> bool {
        matches!(self, ProxyScheme::Https)
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Https => write!(f, "https"),
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(TunnelError::config_error(format!(
                "Unsupported proxy scheme '{}': expected http or https",
                other
            ))),
        }
    }
}

/// 代理认证凭据
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl ProxyCredentials {
    /// 生成 `Proxy-Authorization` 头的值
    pub fn basic_auth_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }
}

// 不在日志中输出密码
impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 上游代理地址
///
/// 由 `scheme://[user:pass@]host[:port]` 形式的 URL 解析而来，解析后只读，
/// 所有会话共享同一个实例
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ProxyEndpoint {
    scheme: ProxyScheme,
    host: String,
    port: u16,
    credentials: Option<ProxyCredentials>,
}

impl ProxyEndpoint {
    /// 解析代理 URL
    pub fn parse(input: &str) -> Result<Self, TunnelError> {
        let url = Url::parse(input.trim())
            .map_err(|e| TunnelError::config_error(format!("Invalid proxy URL '{}': {}", input, e)))?;

        let scheme: ProxyScheme = url.scheme().parse()?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TunnelError::config_error(format!("Proxy URL '{}' has no host", input)))?
            .to_string();

        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let credentials = if url.username().is_empty() && url.password().is_none() {
            None
        } else {
            Some(ProxyCredentials {
                username: decode_userinfo(url.username())?,
                password: decode_userinfo(url.password().unwrap_or(""))?,
            })
        };

        Ok(Self {
            scheme,
            host,
            port,
            credentials,
        })
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    /// 主机名（IPv6 地址带方括号）
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.credentials.as_ref()
    }

    /// 用于拨号的 `host:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// TLS 握手使用的服务器名称（去掉 IPv6 方括号）
    pub fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// `Proxy-Authorization` 头的值（未配置凭据时为 None）
    pub fn proxy_authorization(&self) -> Option<String> {
        self.credentials.as_ref().map(ProxyCredentials::basic_auth_value)
    }

    /// 不含凭据的代理 URL
    pub fn url_without_credentials(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some(c) => write!(f, "{}://{}:***@{}", self.scheme, c.username, self.authority()),
            None => write!(f, "{}", self.url_without_credentials()),
        }
    }
}

impl FromStr for ProxyEndpoint {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProxyEndpoint {
    type Error = TunnelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

fn decode_userinfo(raw: &str) -> Result<String, TunnelError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| TunnelError::config_error(format!("Invalid proxy credentials: {}", e)))
}

/// 隧道目标地址（`host:port`）
///
/// 进程启动时确定，所有会话使用同一个目标
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TargetAddress(String);

impl TargetAddress {
    /// 由主机和端口组成目标地址，IPv6 字面量自动加方括号
    pub fn new(host: &str, port: u16) -> Result<Self, TunnelError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(TunnelError::config_error("Target host cannot be empty"));
        }
        if port == 0 {
            return Err(TunnelError::config_error("Target port cannot be 0"));
        }
        if host.contains(':') && !host.starts_with('[') {
            Ok(Self(format!("[{}]:{}", host, port)))
        } else {
            Ok(Self(format!("{}:{}", host, port)))
        }
    }

    /// 解析 `host:port` 字符串
    pub fn parse(input: &str) -> Result<Self, TunnelError> {
        let input = input.trim();
        let (host, port) = input.rsplit_once(':').ok_or_else(|| {
            TunnelError::config_error(format!("Target '{}' must be in host:port form", input))
        })?;
        let port: u16 = port.parse().map_err(|_| {
            TunnelError::config_error(format!("Invalid port in target '{}'", input))
        })?;
        if host.is_empty() || host == "[]" {
            return Err(TunnelError::config_error(format!(
                "Target '{}' has no host",
                input
            )));
        }
        if host.contains(':') && !host.starts_with('[') {
            return Err(TunnelError::config_error(format!(
                "IPv6 target '{}' must use [addr]:port form",
                input
            )));
        }
        Self::new(host, port)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TargetAddress {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetAddress {
    type Error = TunnelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
