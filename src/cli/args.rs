use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_FORWARD_PORT, DEFAULT_TUNNEL_PORT};

#[derive(Parser, Debug)]
#[command(name = "proxy-tunnel")]
#[command(author, version, about = "TCP tunnel through an HTTP CONNECT proxy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 隧道模式：本地端口经代理 CONNECT 到固定目标
    Tunnel(TunnelArgs),
    /// 转发模式：本地 HTTP 服务经代理转发到固定源站
    Forward(ForwardArgs),
    /// 按配置文件运行
    Run {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,
    },
    /// 检查配置文件格式是否正确
    Check {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,

        /// 输出格式 (text, json)
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// 生成配置模板
    Template {
        /// 模板类型 (tunnel, forward)
        #[arg(value_parser = ["tunnel", "forward"])]
        template_type: String,

        /// 输出文件路径（缺省输出到标准输出）
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// 与上游代理连接相关的公共参数
#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// 上游代理 URL，形如 scheme://[user:pass@]host[:port]
    #[arg(long, default_value = "http://squid-host:3128")]
    pub proxy_url: String,

    /// 不验证代理的 TLS 证书（不安全）
    #[arg(long)]
    pub skip_verify: bool,

    /// 验证代理证书使用的 CA 文件
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// 连接代理超时（秒）
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct TunnelArgs {
    /// 本地监听端口
    #[arg(long, default_value_t = DEFAULT_TUNNEL_PORT)]
    pub local_port: u16,

    /// 本地监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_addr: String,

    /// 隧道目标主机
    #[arg(long, default_value = "target-mysql-host")]
    pub remote_host: String,

    /// 隧道目标端口
    #[arg(long, default_value_t = 3306)]
    pub remote_port: u16,

    #[command(flatten)]
    pub proxy: ProxyArgs,

    /// CONNECT 握手超时（秒）
    #[arg(long, value_name = "SECS")]
    pub handshake_timeout: Option<u64>,

    /// 转发阶段单方向空闲超时（秒）
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// 最大并发会话数
    #[arg(long)]
    pub max_sessions: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ForwardArgs {
    /// 本地监听端口
    #[arg(long, default_value_t = DEFAULT_FORWARD_PORT)]
    pub local_port: u16,

    /// 本地监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_addr: String,

    /// 转发目标源站 URL（如 https://api.example.com）
    #[arg(long)]
    pub target_url: String,

    #[command(flatten)]
    pub proxy: ProxyArgs,
}
