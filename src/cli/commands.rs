use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::{tls_options, AppConfig, ForwardConfig, TimeoutConfig, TunnelConfig};
use crate::{forward, tunnel};

use super::args::{ForwardArgs, TunnelArgs};
use super::config::{check_config, check_config_file_permissions, expand_path};
use super::template;

/// Execute CLI commands
pub async fn execute_command(cli: &super::Cli) -> Result<()> {
    use super::Commands;

    match &cli.command {
        Commands::Tunnel(args) => {
            let config = tunnel_config_from_args(args)?;
            tunnel::run_tunnel(config, shutdown_signal()).await?;
        }
        Commands::Forward(args) => {
            let config = forward_config_from_args(args)?;
            forward::run_forward(config, shutdown_signal()).await?;
        }
        Commands::Run { config } => {
            run_from_file(config).await?;
        }
        Commands::Check { config, format } => {
            let config_path = expand_path(config)?;
            check_config(&config_path, format)?;
        }
        Commands::Template {
            template_type,
            output,
        } => {
            template::generate_config_template(template_type, output.as_deref())?;
        }
    }

    Ok(())
}

/// Run either mode from a configuration file
async fn run_from_file(config: &str) -> Result<()> {
    let config_path = expand_path(config)?;

    // 配置中可能包含代理凭据
    check_config_file_permissions(&config_path)?;

    info!("Loading configuration from: {}", config_path);
    match AppConfig::from_file(&config_path)? {
        AppConfig::Tunnel(config) => tunnel::run_tunnel(config, shutdown_signal()).await,
        AppConfig::Forward(config) => forward::run_forward(config, shutdown_signal()).await,
    }
}

/// 由命令行参数组装隧道配置
pub fn tunnel_config_from_args(args: &TunnelArgs) -> Result<TunnelConfig> {
    TunnelConfig::builder()
        .listen_addr(&args.listen_addr)
        .local_port(args.local_port)
        .proxy_url(&args.proxy.proxy_url)
        .remote_host(&args.remote_host)
        .remote_port(args.remote_port)
        .tls(tls_options(args.proxy.skip_verify, args.proxy.ca_cert.clone()))
        .timeouts(TimeoutConfig {
            connect_timeout_secs: args.proxy.connect_timeout,
            handshake_timeout_secs: args.handshake_timeout,
            idle_timeout_secs: args.idle_timeout,
        })
        .max_sessions(args.max_sessions)
        .build()
}

/// 由命令行参数组装转发配置
pub fn forward_config_from_args(args: &ForwardArgs) -> Result<ForwardConfig> {
    ForwardConfig::builder()
        .listen_addr(&args.listen_addr)
        .local_port(args.local_port)
        .proxy_url(&args.proxy.proxy_url)
        .target_url(&args.target_url)
        .tls(tls_options(args.proxy.skip_verify, args.proxy.ca_cert.clone()))
        .timeouts(TimeoutConfig {
            connect_timeout_secs: args.proxy.connect_timeout,
            ..TimeoutConfig::default()
        })
        .build()
}

/// Ctrl+C 时广播关闭信号
fn shutdown_signal() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                // 保留发送端，避免接收端把通道关闭当作关闭信号
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    shutdown_rx
}
