//! TCP relay: the listener that accepts connections and runs one session per
//! connection
//!
//! A local relay accepts SOCKS5 clients and opens a tunnel per client. A
//! server relay accepts tunnels (answering plain HTTP requests) and dials the
//! destination named in each tunnel's first frame.

use crate::config::{Config, RelayMode};
use crate::error::{RelayError, SessionError};
use crate::helper::{log_session_end, ACCEPT_ERROR_DELAY};
use crate::session::{LocalSession, ServerSession, SessionId, SessionRegistry, SessionSettings};
use crate::transport::{accept_tunnel, WsConnector};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Lifecycle of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    /// Created, not yet listening
    Init,
    /// Listening and accepting connections
    Running,
    /// Stopped; a stopped relay cannot be restarted
    Stopped,
}

enum Phase {
    Init,
    Running {
        local_addr: SocketAddr,
        accept: Option<JoinHandle<()>>,
    },
    Stopped,
}

/// What each accepted connection is turned into
#[derive(Clone)]
enum Frontend {
    Local(Arc<WsConnector>),
    Server,
}

impl Frontend {
    async fn serve(
        &self,
        id: SessionId,
        stream: TcpStream,
        settings: Arc<SessionSettings>,
    ) -> Result<(), SessionError> {
        match self {
            Frontend::Local(connector) => {
                LocalSession::new(id, stream, connector.clone(), settings)
                    .run()
                    .await
            }
            Frontend::Server => match accept_tunnel(stream).await? {
                Some(tunnel) => ServerSession::new(id, tunnel, settings).run().await,
                None => Ok(()),
            },
        }
    }
}

/// One listener and the sessions it spawned
pub struct TcpRelay {
    config: Config,
    mode: RelayMode,
    settings: Arc<SessionSettings>,
    frontend: Frontend,
    registry: Arc<SessionRegistry>,
    limit: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    phase: Mutex<Phase>,
}

impl TcpRelay {
    /// Validate the configuration and prepare a relay for `mode`
    pub fn new(config: Config, mode: RelayMode) -> Result<Self, RelayError> {
        config.validate()?;
        let settings = Arc::new(SessionSettings::from_config(&config)?);

        let frontend = match mode {
            RelayMode::Local => Frontend::Local(Arc::new(WsConnector::new(
                config.tunnel_url()?,
                settings.socket_opts.clone(),
            ))),
            RelayMode::Server => Frontend::Server,
        };

        Ok(TcpRelay {
            registry: Arc::new(SessionRegistry::new(config.max_connections)),
            limit: Arc::new(Semaphore::new(config.max_connections as usize)),
            config,
            mode,
            settings,
            frontend,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            phase: Mutex::new(Phase::Init),
        })
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Which side this relay runs
    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    /// Configuration the relay was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current lifecycle state
    pub fn status(&self) -> RelayStatus {
        match &*self.phase() {
            Phase::Init => RelayStatus::Init,
            Phase::Running { .. } => RelayStatus::Running,
            Phase::Stopped => RelayStatus::Stopped,
        }
    }

    /// Address the listener is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.phase() {
            Phase::Running { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// Live sessions of this relay
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind the listener and start accepting
    ///
    /// Resolves with the bound address once listening.
    pub async fn init_server(&self) -> Result<SocketAddr, RelayError> {
        self.ensure_startable()?;

        let addr = self.config.listen_addr(self.mode);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let mut phase = self.phase();
        // Another caller may have started the relay while we were binding
        self.ensure_startable_locked(&phase)?;

        let accept = tokio::spawn(accept_loop(
            listener,
            AcceptContext {
                frontend: self.frontend.clone(),
                settings: self.settings.clone(),
                registry: self.registry.clone(),
                limit: self.limit.clone(),
                shutdown: self.shutdown.clone(),
                tracker: self.tracker.clone(),
            },
        ));
        *phase = Phase::Running {
            local_addr,
            accept: Some(accept),
        };
        drop(phase);

        match &self.frontend {
            Frontend::Local(connector) => info!(
                "Local relay listening on {}, tunnel {}",
                local_addr,
                connector.url()
            ),
            Frontend::Server => info!("Server relay listening on {}", local_addr),
        }
        Ok(local_addr)
    }

    fn ensure_startable(&self) -> Result<(), RelayError> {
        let phase = self.phase();
        self.ensure_startable_locked(&phase)
    }

    fn ensure_startable_locked(&self, phase: &Phase) -> Result<(), RelayError> {
        match phase {
            Phase::Init => Ok(()),
            Phase::Running { local_addr, .. } => Err(RelayError::AlreadyRunning(*local_addr)),
            Phase::Stopped => Err(RelayError::Config("Relay has been stopped".to_string())),
        }
    }

    /// Close the listener and force-close every session
    ///
    /// Resolves once the accept loop and all session tasks have finished.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        let accept = {
            let mut phase = self.phase();
            match std::mem::replace(&mut *phase, Phase::Stopped) {
                Phase::Running { accept, .. } => accept,
                Phase::Init => None,
                Phase::Stopped => return,
            }
        };

        info!("Stopping {} relay", self.mode);
        self.shutdown.cancel();
        let closed = self.registry.close_all();

        if let Some(handle) = accept {
            if let Err(e) = handle.await {
                warn!("Accept loop ended abnormally: {}", e);
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("Relay stopped, {} sessions closed", closed);
    }
}

/// Everything the accept loop shares with the relay
struct AcceptContext {
    frontend: Frontend,
    settings: Arc<SessionSettings>,
    registry: Arc<SessionRegistry>,
    limit: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

async fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    time::sleep(ACCEPT_ERROR_DELAY).await;
                    continue;
                }
            },
        };

        let permit = match ctx.limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, dropping {}", peer);
                continue;
            }
        };

        ctx.settings.socket_opts.hint(&stream);
        let guard = ctx.registry.register(ctx.shutdown.child_token());
        let frontend = ctx.frontend.clone();
        let settings = ctx.settings.clone();

        ctx.tracker.spawn(async move {
            let _permit = permit;
            let id = guard.id();
            debug!("Session {} accepted from {}", id, peer);

            tokio::select! {
                result = frontend.serve(id, stream, settings) => log_session_end(id, &result),
                _ = guard.token().cancelled() => debug!("Session {} closed by shutdown", id),
            }
        });
    }

    debug!("Listener closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn loopback(mode: RelayMode) -> Config {
        let mut config = Config::for_mode(mode);
        match mode {
            RelayMode::Local => config.local_port = 0,
            RelayMode::Server => {
                config.server_address = "127.0.0.1".to_string();
                config.server_port = 0;
            }
        }
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            method: "des-cbc".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            TcpRelay::new(config, RelayMode::Local),
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let relay = TcpRelay::new(loopback(RelayMode::Server), RelayMode::Server).unwrap();
        assert_eq!(relay.status(), RelayStatus::Init);
        assert_eq!(relay.local_addr(), None);

        let addr = relay.init_server().await.unwrap();
        assert_eq!(relay.status(), RelayStatus::Running);
        assert_eq!(relay.local_addr(), Some(addr));
        assert_ne!(addr.port(), 0);

        assert!(matches!(
            relay.init_server().await,
            Err(RelayError::AlreadyRunning(a)) if a == addr
        ));

        relay.stop().await;
        assert_eq!(relay.status(), RelayStatus::Stopped);
        assert_eq!(relay.local_addr(), None);
        assert!(TcpStream::connect(addr).await.is_err());

        // Idempotent, and no restart
        relay.stop().await;
        assert!(matches!(
            relay.init_server().await,
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = loopback(RelayMode::Local);
        config.local_port = taken.local_addr().unwrap().port();

        let relay = TcpRelay::new(config, RelayMode::Local).unwrap();
        assert!(matches!(
            relay.init_server().await,
            Err(RelayError::Bind { .. })
        ));
        assert_eq!(relay.status(), RelayStatus::Init);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let relay = TcpRelay::new(loopback(RelayMode::Local), RelayMode::Local).unwrap();
        relay.stop().await;
        assert_eq!(relay.status(), RelayStatus::Stopped);
    }

    #[tokio::test]
    async fn test_server_answers_plain_http() {
        let relay = TcpRelay::new(loopback(RelayMode::Server), RelayMode::Server).unwrap();
        let addr = relay.init_server().await.unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("Hello world"));

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_open_sessions() {
        let relay = TcpRelay::new(loopback(RelayMode::Local), RelayMode::Local).unwrap();
        let addr = relay.init_server().await.unwrap();

        // Greeting answered, session parked waiting for the request
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
        assert_eq!(relay.registry().active_count(), 1);

        relay.stop().await;
        assert_eq!(relay.registry().active_count(), 0);

        let mut rest = Vec::new();
        let n = client.read_to_end(&mut rest).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connection_limit_drops_surplus() {
        let mut config = loopback(RelayMode::Local);
        config.max_connections = 1;
        let relay = TcpRelay::new(config, RelayMode::Local).unwrap();
        let addr = relay.init_server().await.unwrap();

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        first.read_exact(&mut reply).await.unwrap();

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = second.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(relay.registry().active_count(), 1);

        relay.stop().await;
    }
}
