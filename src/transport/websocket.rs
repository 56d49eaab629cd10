//! Client side of the WebSocket tunnel

use super::{SocketOpts, TunnelStream};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

/// Tunnel opened by [`WsConnector`]
pub type ClientTunnel = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one tunnel per local session
#[async_trait]
pub trait TunnelConnector: Send + Sync + 'static {
    /// The tunnel type produced by this connector
    type Tunnel: TunnelStream;

    /// Open a new tunnel to the relay server
    async fn connect(&self) -> Result<Self::Tunnel, WsError>;
}

/// Connects to `ws://server_address:server_port/`
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    socket_opts: SocketOpts,
}

impl WsConnector {
    /// Create a connector for `url`
    pub fn new(url: Url, socket_opts: SocketOpts) -> Self {
        WsConnector { url, socket_opts }
    }

    /// Tunnel endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TunnelConnector for WsConnector {
    type Tunnel = ClientTunnel;

    async fn connect(&self) -> Result<Self::Tunnel, WsError> {
        let (tunnel, response) = connect_async(self.url.as_str()).await?;

        if let MaybeTlsStream::Plain(stream) = tunnel.get_ref() {
            self.socket_opts.hint(stream);
        }

        debug!("Tunnel open to {} ({})", self.url, response.status());
        Ok(tunnel)
    }
}
