/// Proxy Tunnel 库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod acceptor;
pub mod cli;
pub mod config;
pub mod connector;
pub mod error;
pub mod forward;
pub mod relay;
pub mod session;
pub mod stream;
pub mod tls;
pub mod transport;
pub mod tunnel;

// 重新导出常用类型
pub use acceptor::{Accept, ConnectionAcceptor, ConnectionHandler};
pub use config::{AppConfig, ForwardConfig, ProxyEndpoint, TargetAddress, TunnelConfig};
pub use connector::{build_connect_request, ProxyConnector};
pub use error::{ConnectError, Result, TunnelError};
pub use forward::{run_forward, ForwardServer};
pub use relay::{relay, Direction, RelayOptions, RelayOutcome};
pub use session::{SessionReport, SessionState, TunnelSession};
pub use stream::TunnelStream;
pub use tunnel::{run_tunnel, TunnelHandler, TunnelServer};
