use anyhow::{bail, Result};
use tracing::warn;

use super::{ForwardConfig, TimeoutConfig, TlsOptions, TunnelConfig};

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证地址不为空
    pub fn validate_address(addr: &str, context: &str) -> Result<()> {
        if addr.trim().is_empty() {
            bail!("{}: address cannot be empty", context);
        }
        Ok(())
    }

    /// 验证超时配置（配置了就必须大于 0）
    pub fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<()> {
        let fields = [
            ("connect_timeout_secs", timeouts.connect_timeout_secs),
            ("handshake_timeout_secs", timeouts.handshake_timeout_secs),
            ("idle_timeout_secs", timeouts.idle_timeout_secs),
        ];
        for (name, value) in fields {
            if value == Some(0) {
                bail!("{} must be greater than 0 (omit it to disable)", name);
            }
        }
        Ok(())
    }

    /// 验证 TLS 选项
    pub fn validate_tls(tls: &TlsOptions) -> Result<()> {
        if let Some(ref path) = tls.ca_cert_path {
            if tls.skip_verify {
                warn!(
                    "ca_cert_path {:?} is ignored because skip_verify is enabled",
                    path
                );
            } else if !path.exists() {
                bail!("CA certificate file not found: {:?}", path);
            }
        }
        Ok(())
    }

    /// 验证隧道模式配置
    pub fn validate_tunnel_config(config: &TunnelConfig) -> Result<()> {
        Self::validate_address(&config.listen_addr, "Tunnel listen_addr")?;
        Self::validate_timeouts(&config.timeouts)?;
        Self::validate_tls(&config.tls)?;

        if config.max_sessions == Some(0) {
            bail!("max_sessions must be greater than 0 (omit it for no limit)");
        }

        Ok(())
    }

    /// 验证转发模式配置
    pub fn validate_forward_config(config: &ForwardConfig) -> Result<()> {
        Self::validate_address(&config.listen_addr, "Forward listen_addr")?;
        Self::validate_timeouts(&config.timeouts)?;
        Self::validate_tls(&config.tls)?;

        let url = &config.target_url;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "target_url '{}' must use http or https scheme",
                url.as_str()
            );
        }
        if url.host_str().map(str::is_empty).unwrap_or(true) {
            bail!("target_url '{}' has no host", url.as_str());
        }

        Ok(())
    }
}
