//! Per-connection relay sessions
//!
//! A local session turns a SOCKS5 client connection into a tunnel; a server
//! session turns a tunnel into a TCP connection to the requested destination.
//! Each runs as one task that owns both transports, its cipher halves and its
//! pending queue, so none of that state is shared.

mod idle;
mod local;
mod pending;
mod registry;
mod server;
mod stage;

pub use idle::IdleTimer;
pub use local::LocalSession;
pub use pending::{PendingError, PendingQueue};
pub use registry::{SessionGuard, SessionId, SessionRegistry, MAX_CONNECTIONS};
pub use server::ServerSession;
pub use stage::{LocalStage, ServerStage, Stage, StageTracker};

use crate::config::Config;
use crate::crypto::{CipherError, MasterKey};
use crate::error::SessionError;
use crate::helper::DEFAULT_BUFFER_SIZE;
use crate::transport::SocketOpts;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Settings shared by every session of one relay
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Cipher method and derived key
    pub master_key: MasterKey,
    /// Options for accepted and dialed TCP sockets
    pub socket_opts: SocketOpts,
    /// Local side only: drop the session after this long without traffic
    pub idle_timeout: Duration,
    /// Local side only: ping the tunnel this often
    pub keepalive_interval: Duration,
    /// Read buffer size per direction
    pub buffer_size: usize,
}

impl SessionSettings {
    /// Build from configuration, deriving the cipher key
    pub fn from_config(config: &Config) -> Result<Self, CipherError> {
        Ok(SessionSettings {
            master_key: MasterKey::new(&config.method, &config.password)?,
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            idle_timeout: config.idle_timeout(),
            keepalive_interval: config.keepalive_interval(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        })
    }
}

/// Next binary frame from the tunnel
///
/// Control and text frames are skipped. A close frame or the end of the
/// stream is reported as [`SessionError::PeerClosed`].
pub(crate) async fn next_frame<R>(rx: &mut R) -> Result<Vec<u8>, SessionError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match rx.next().await {
            Some(Ok(Message::Binary(data))) => return Ok(data),
            Some(Ok(Message::Close(_))) | None => return Err(SessionError::PeerClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory tunnels for session tests

    use crate::config::Config;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::WebSocketStream;

    use super::SessionSettings;

    /// Client and server ends of a WebSocket over a duplex pipe
    pub async fn tunnel_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    pub fn settings() -> SessionSettings {
        SessionSettings::from_config(&Config::default()).unwrap()
    }
}
