//! Tunnel-fronted session: tunnel in, destination socket out

use super::{
    next_frame, PendingQueue, ServerStage, SessionId, SessionSettings, Stage, StageTracker,
};
use crate::crypto::{Decryptor, Encryptor};
use crate::error::SessionError;
use crate::protocol::{AddressHeader, MIN_ADDRESS_HEADER_LEN};
use crate::transport::TunnelStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace};

/// One tunnel relayed to the destination named in its first frame
///
/// There is no idle timeout or keepalive on this side; the session lives
/// until either transport closes.
pub struct ServerSession<T> {
    id: SessionId,
    tunnel: T,
    settings: Arc<SessionSettings>,
    stage: StageTracker<ServerStage>,
    pending: PendingQueue,
    encryptor: Encryptor,
    decryptor: Decryptor,
}

impl<T: TunnelStream> ServerSession<T> {
    /// Create a session for an accepted tunnel
    pub fn new(id: SessionId, tunnel: T, settings: Arc<SessionSettings>) -> Self {
        let (encryptor, decryptor) = settings.master_key.cipher().split();
        ServerSession {
            id,
            tunnel,
            settings,
            stage: StageTracker::new(),
            pending: PendingQueue::new(),
            encryptor,
            decryptor,
        }
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current stage
    pub fn stage(&self) -> ServerStage {
        self.stage.current()
    }

    /// Drive the session to completion
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.drive().await;
        trace!("Session {} destroyed in {}", self.id, self.stage.current().name());
        self.stage.destroy();
        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        // INIT
        let frame = next_frame(&mut self.tunnel).await?;
        let data = self.decryptor.decrypt(&frame)?;
        if data.len() < MIN_ADDRESS_HEADER_LEN {
            return Err(SessionError::MalformedRequest);
        }
        let header = AddressHeader::parse(&data, 0)?;
        self.pending.push(&data[header.header_len()..])?;
        self.stage.advance(ServerStage::Connecting)?;

        // CONNECTING
        let target = header.to_string();
        debug!("Session {} connecting to {}", self.id, target);

        let connect = TcpStream::connect((header.host(), header.port()));
        tokio::pin!(connect);

        let mut dest = loop {
            tokio::select! {
                result = &mut connect => {
                    break result.map_err(|source| SessionError::DestinationConnect {
                        target: target.clone(),
                        source,
                    })?;
                }
                frame = next_frame(&mut self.tunnel) => {
                    let data = self.decryptor.decrypt(&frame?)?;
                    self.pending.push(&data)?;
                }
            }
        };

        self.settings.socket_opts.hint(&dest);
        let queued = self.pending.flush_and_freeze()?;
        if !queued.is_empty() {
            dest.write_all(&queued).await?;
        }
        self.stage.advance(ServerStage::Stream)?;
        info!("Session {} connected to {}", self.id, target);

        // STREAM
        let (dest_rx, dest_tx) = dest.split();
        let (tunnel_tx, tunnel_rx) = (&mut self.tunnel).split::<Message>();
        let buf = vec![0u8; self.settings.buffer_size];

        tokio::select! {
            result = uplink(dest_rx, tunnel_tx, &mut self.encryptor, buf) => result,
            result = downlink(tunnel_rx, dest_tx, &mut self.decryptor) => result,
        }
    }
}

/// Destination to tunnel
async fn uplink<R, W>(
    mut dest_rx: R,
    mut tunnel_tx: W,
    encryptor: &mut Encryptor,
    mut buf: Vec<u8>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let n = dest_rx.read(&mut buf).await?;
        if n == 0 {
            return Err(SessionError::PeerClosed);
        }
        let frame = encryptor.encrypt(&buf[..n])?;
        tunnel_tx.send(Message::Binary(frame)).await?;
    }
}

/// Tunnel to destination
async fn downlink<R, W>(
    mut tunnel_rx: R,
    mut dest_tx: W,
    decryptor: &mut Decryptor,
) -> Result<(), SessionError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = next_frame(&mut tunnel_rx).await?;
        let plain = decryptor.decrypt(&frame)?;
        if !plain.is_empty() {
            dest_tx.write_all(&plain).await?;
        }
    }
}
