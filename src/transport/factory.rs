// 拨号器工厂 - 根据代理协议创建拨号器

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsConnector;

use super::{ProxyDialer, TcpDialer, TlsDialer};
use crate::config::{ProxyEndpoint, ProxyScheme, TlsOptions};
use crate::tls;

/// 创建上游代理拨号器
pub fn create_dialer(
    proxy: &ProxyEndpoint,
    tls_options: &TlsOptions,
    connect_timeout: Option<Duration>,
) -> Result<Arc<dyn ProxyDialer>> {
    let dialer: Arc<dyn ProxyDialer> = match proxy.scheme() {
        ProxyScheme::Http => Arc::new(TcpDialer::new(proxy.authority(), connect_timeout)),
        ProxyScheme::Https => {
            let client_config =
                tls::load_client_config(tls_options).context("Failed to load TLS configuration")?;
            Arc::new(TlsDialer::new(
                proxy.authority(),
                proxy.server_name(),
                TlsConnector::from(client_config),
                connect_timeout,
            )?)
        }
    };

    Ok(dialer)
}
