use anyhow::{Context, Result};
use std::path::PathBuf;
use url::Url;

use super::{
    ForwardConfig, ProxyEndpoint, TargetAddress, TimeoutConfig, TlsOptions, TunnelConfig,
    DEFAULT_FORWARD_PORT, DEFAULT_TUNNEL_PORT,
};

/// TunnelConfig Builder
#[derive(Debug, Default)]
pub struct TunnelConfigBuilder {
    listen_addr: Option<String>,
    local_port: Option<u16>,
    proxy_url: Option<String>,
    remote_host: Option<String>,
    remote_port: Option<u16>,
    tls: TlsOptions,
    timeouts: TimeoutConfig,
    max_sessions: Option<usize>,
}

impl TunnelConfigBuilder {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置监听地址
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// 设置监听端口
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    /// 设置上游代理 URL
    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// 设置目标主机
    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    /// 设置目标端口
    pub fn remote_port(mut self, port: u16) -> Self {
        self.remote_port = Some(port);
        self
    }

    /// 设置 TLS 选项
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// 设置超时
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// 设置最大并发会话数
    pub fn max_sessions(mut self, max: Option<usize>) -> Self {
        self.max_sessions = max;
        self
    }

    /// 构建并验证配置
    pub fn build(self) -> Result<TunnelConfig> {
        let proxy_url = self.proxy_url.context("proxy_url is required")?;
        let remote_host = self.remote_host.context("remote_host is required")?;
        let remote_port = self.remote_port.context("remote_port is required")?;

        let config = TunnelConfig {
            listen_addr: self.listen_addr.unwrap_or_else(super::default_listen_addr),
            local_port: self.local_port.unwrap_or(DEFAULT_TUNNEL_PORT),
            proxy_url: ProxyEndpoint::parse(&proxy_url)?,
            target: TargetAddress::new(&remote_host, remote_port)?,
            tls: self.tls,
            timeouts: self.timeouts,
            max_sessions: self.max_sessions,
        };

        config.validate()?;
        Ok(config)
    }
}

/// ForwardConfig Builder
#[derive(Debug, Default)]
pub struct ForwardConfigBuilder {
    listen_addr: Option<String>,
    local_port: Option<u16>,
    proxy_url: Option<String>,
    target_url: Option<String>,
    tls: TlsOptions,
    timeouts: TimeoutConfig,
}

impl ForwardConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn build(self) -> Result<ForwardConfig> {
        let proxy_url = self.proxy_url.context("proxy_url is required")?;
        let target_url = self.target_url.context("target_url is required")?;
        let target_url = Url::parse(&target_url)
            .with_context(|| format!("Invalid target URL: {}", target_url))?;

        let config = ForwardConfig {
            listen_addr: self.listen_addr.unwrap_or_else(super::default_listen_addr),
            local_port: self.local_port.unwrap_or(DEFAULT_FORWARD_PORT),
            proxy_url: ProxyEndpoint::parse(&proxy_url)?,
            target_url,
            tls: self.tls,
            timeouts: self.timeouts,
        };

        config.validate()?;
        Ok(config)
    }
}

/// 从命令行参数组装 TLS 选项
pub fn tls_options(skip_verify: bool, ca_cert: Option<PathBuf>) -> TlsOptions {
    TlsOptions {
        skip_verify,
        ca_cert_path: ca_cert,
    }
}
