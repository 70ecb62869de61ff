/// 隧道会话
///
/// 一个入站连接对应一个会话：先通过代理建立隧道，成功后进入双向转发。
/// 状态只向前推进，不重试
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::connector::ProxyConnector;
use crate::error::ConnectError;
use crate::relay::{relay, DirectionEnd, RelayOptions, RelayOutcome};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Connecting,
    Relaying,
    /// 握手失败（终态）
    Failed,
    /// 转发结束或被主动关闭（终态）
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Accepted => "accepted",
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// 会话结束报告
#[derive(Debug)]
pub struct SessionReport {
    pub id: u64,
    pub peer: SocketAddr,
    pub state: SessionState,
    pub connect_error: Option<ConnectError>,
    pub relay: Option<RelayOutcome>,
}

impl SessionReport {
    pub fn client_to_tunnel(&self) -> u64 {
        self.relay.as_ref().map_or(0, |r| r.client_to_tunnel)
    }

    pub fn tunnel_to_client(&self) -> u64 {
        self.relay.as_ref().map_or(0, |r| r.tunnel_to_client)
    }
}

pub struct TunnelSession<C> {
    id: u64,
    peer: SocketAddr,
    state: SessionState,
    client: Option<C>,
    connector: Arc<ProxyConnector>,
    relay_options: RelayOptions,
    closed: bool,
}

impl<C> TunnelSession<C>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(
        id: u64,
        peer: SocketAddr,
        client: C,
        connector: Arc<ProxyConnector>,
        relay_options: RelayOptions,
    ) -> Self {
        Self {
            id,
            peer,
            state: SessionState::Accepted,
            client: Some(client),
            connector,
            relay_options,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            "Session {} ({}): {} -> {}",
            self.id, self.peer, self.state, next
        );
        self.state = next;
    }

    /// 运行会话直到结束，所有退出路径都会关闭两条连接
    pub async fn run(mut self) -> SessionReport {
        // 运行前已被关闭，不再连接代理
        let Some(client) = self.client.take() else {
            return self.report(None, None);
        };
        self.transition(SessionState::Connecting);

        let tunnel = match self.connector.connect().await {
            Ok(tunnel) => tunnel,
            Err(e) => {
                self.log_connect_error(&e);
                self.transition(SessionState::Failed);
                drop(client);
                self.close();
                return self.report(Some(e), None);
            }
        };

        info!(
            "Session {} ({}): tunnel to {} established via {}",
            self.id,
            self.peer,
            self.connector.target(),
            self.connector.proxy_addr()
        );
        self.transition(SessionState::Relaying);

        let outcome = relay(client, tunnel, &self.relay_options).await;
        match &outcome.end {
            DirectionEnd::Eof => {}
            DirectionEnd::Failed(e) => debug!(
                "Session {} ({}): {} ended with error: {}",
                self.id, self.peer, outcome.first_closed, e
            ),
            DirectionEnd::Crashed(msg) => warn!(
                "Session {} ({}): {} {}",
                self.id, self.peer, outcome.first_closed, msg
            ),
        }
        info!(
            "Session {} ({}): closed, sent {} bytes, received {} bytes",
            self.id, self.peer, outcome.client_to_tunnel, outcome.tunnel_to_client
        );

        self.close();
        self.report(None, Some(outcome))
    }

    /// 关闭会话持有的连接，重复调用无副作用
    ///
    /// 返回本次调用是否实际执行了关闭
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        drop(self.client.take());

        if self.state != SessionState::Failed {
            self.transition(SessionState::Closed);
        }
        true
    }

    fn log_connect_error(&self, e: &ConnectError) {
        match e {
            ConnectError::Rejected { body, .. } => warn!(
                "Session {} ({}): {} (body {} bytes)",
                self.id,
                self.peer,
                e,
                body.len()
            ),
            ConnectError::ProxyUnreachable { .. } => {
                error!("Session {} ({}): {}", self.id, self.peer, e)
            }
            _ => warn!("Session {} ({}): {}", self.id, self.peer, e),
        }
    }

    fn report(&self, connect_error: Option<ConnectError>, relay: Option<RelayOutcome>) -> SessionReport {
        SessionReport {
            id: self.id,
            peer: self.peer,
            state: self.state,
            connect_error,
            relay,
        }
    }
}
