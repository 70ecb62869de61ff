// 配置管理模块 - 使用模块化设计

mod builder;
mod endpoint;
mod validator;

pub use builder::{tls_options, ForwardConfigBuilder, TunnelConfigBuilder};
pub use endpoint::{ProxyCredentials, ProxyEndpoint, ProxyScheme, TargetAddress};
pub use validator::ConfigValidator;

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// 隧道模式默认监听端口
pub const DEFAULT_TUNNEL_PORT: u16 = 8088;

/// 转发模式默认监听端口
pub const DEFAULT_FORWARD_PORT: u16 = 12345;

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_tunnel_port() -> u16 {
    DEFAULT_TUNNEL_PORT
}

fn default_forward_port() -> u16 {
    DEFAULT_FORWARD_PORT
}

/// 与上游代理之间的 TLS 选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TlsOptions {
    /// 是否跳过证书验证（不安全，需显式开启）
    #[serde(default)]
    pub skip_verify: bool,
    /// 自定义 CA 证书路径（可选，默认使用系统证书）
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
}

/// 超时配置（秒），缺省表示不限制
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TimeoutConfig {
    /// 连接代理（含 TLS 握手）超时
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// CONNECT 请求发送与响应读取超时
    #[serde(default)]
    pub handshake_timeout_secs: Option<u64>,
    /// 转发阶段单方向空闲超时
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn handshake(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    pub fn idle(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// 隧道模式配置
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    /// 本地监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// 本地监听端口（0 表示由系统分配）
    #[serde(default = "default_tunnel_port")]
    pub local_port: u16,
    /// 上游代理 URL
    pub proxy_url: ProxyEndpoint,
    /// 隧道目标（host:port）
    pub target: TargetAddress,
    #[serde(default)]
    pub tls: TlsOptions,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// 最大并发会话数（缺省不限制）
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

impl TunnelConfig {
    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::new()
    }

    /// 监听的 socket 地址
    pub fn listen_socket_addr(&self) -> String {
        join_host_port(&self.listen_addr, self.local_port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_tunnel_config(self)
    }
}

/// 转发模式配置
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_forward_port")]
    pub local_port: u16,
    /// 上游代理 URL
    pub proxy_url: ProxyEndpoint,
    /// 转发目标源站（如 https://api.example.com）
    pub target_url: Url,
    #[serde(default)]
    pub tls: TlsOptions,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl ForwardConfig {
    pub fn builder() -> ForwardConfigBuilder {
        ForwardConfigBuilder::new()
    }

    pub fn listen_socket_addr(&self) -> String {
        join_host_port(&self.listen_addr, self.local_port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_forward_config(self)
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AppConfig {
    Tunnel(TunnelConfig),
    Forward(ForwardConfig),
}

impl AppConfig {
    /// 从字符串解析并验证配置
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Failed to parse configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// 从文件加载配置
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            AppConfig::Tunnel(c) => c.validate(),
            AppConfig::Forward(c) => c.validate(),
        }
    }

    /// 配置类型名称
    pub fn mode(&self) -> &'static str {
        match self {
            AppConfig::Tunnel(_) => "tunnel",
            AppConfig::Forward(_) => "forward",
        }
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
