//! SOCKS5-fronted session: client socket in, tunnel out

use super::{
    next_frame, IdleTimer, LocalStage, PendingQueue, SessionId, SessionSettings, Stage,
    StageTracker,
};
use crate::crypto::{Decryptor, Encryptor};
use crate::error::SessionError;
use crate::protocol::REQUEST_HEADER_OFFSET;
use crate::socks::{
    parse_greeting, parse_request, send_command_not_supported, send_greeting, send_success,
    SocksCommand,
};
use crate::transport::{TunnelConnector, TunnelStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace};

/// One SOCKS5 client connection relayed over its own tunnel
pub struct LocalSession<S, C> {
    id: SessionId,
    client: S,
    connector: Arc<C>,
    settings: Arc<SessionSettings>,
    stage: StageTracker<LocalStage>,
    pending: PendingQueue,
    idle: IdleTimer,
    encryptor: Encryptor,
    decryptor: Decryptor,
}

impl<S, C> LocalSession<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: TunnelConnector,
{
    /// Create a session for an accepted client connection
    pub fn new(id: SessionId, client: S, connector: Arc<C>, settings: Arc<SessionSettings>) -> Self {
        let (encryptor, decryptor) = settings.master_key.cipher().split();
        LocalSession {
            id,
            client,
            connector,
            idle: IdleTimer::new(settings.idle_timeout),
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
    pub fn stage(&self) -> LocalStage {
        self.stage.current()
    }

    /// Drive the session to completion
    ///
    /// Always ends in DESTROYED. Both transports are dropped on return, which
    /// closes them without a graceful shutdown handshake.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let idle = self.idle.clone();
        let result = tokio::select! {
            result = self.drive() => result,
            _ = idle.expired() => Err(SessionError::IdleTimeout),
        };

        trace!("Session {} destroyed in {}", self.id, self.stage.current().name());
        self.stage.destroy();
        result
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        let n = self.client.read(buf).await?;
        if n == 0 {
            return Err(SessionError::PeerClosed);
        }
        self.idle.touch();
        Ok(n)
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let mut buf = vec![0u8; self.settings.buffer_size];

        // INIT
        let n = self.read_chunk(&mut buf).await?;
        parse_greeting(&buf[..n])?;
        send_greeting(&mut self.client).await?;
        self.stage.advance(LocalStage::Addr)?;

        // ADDR
        let n = self.read_chunk(&mut buf).await?;
        let request = parse_request(&buf[..n])?;
        if request.command != SocksCommand::Connect {
            send_command_not_supported(&mut self.client).await?;
            if let Err(e) = self.client.shutdown().await {
                trace!("Session {} client shutdown failed: {}", self.id, e);
            }
            return Err(SessionError::UnsupportedCommand(request.command.to_byte()));
        }
        send_success(&mut self.client).await?;
        self.stage.advance(LocalStage::Connecting)?;
        debug!("Session {} requested {}", self.id, request.header);

        // Header plus whatever payload rode along with the request
        let first_frame = buf[REQUEST_HEADER_OFFSET..n].to_vec();

        // CONNECTING
        let connector = Arc::clone(&self.connector);
        let connect = connector.connect();
        tokio::pin!(connect);

        let mut tunnel = loop {
            tokio::select! {
                result = &mut connect => {
                    break result.map_err(|e| SessionError::TunnelConnect(Box::new(e)))?;
                }
                read = self.client.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Err(SessionError::PeerClosed);
                    }
                    self.idle.touch();
                    self.pending.push(&buf[..n])?;
                }
            }
        };

        tunnel
            .send(Message::Binary(self.encryptor.encrypt(&first_frame)?))
            .await?;
        let queued = self.pending.flush_and_freeze()?;
        if !queued.is_empty() {
            tunnel
                .send(Message::Binary(self.encryptor.encrypt(&queued)?))
                .await?;
        }
        self.stage.advance(LocalStage::Stream)?;
        info!("Session {} tunneled to {}", self.id, request.header);

        // STREAM
        self.stream(tunnel, buf).await
    }

    async fn stream<T: TunnelStream>(&mut self, tunnel: T, buf: Vec<u8>) -> Result<(), SessionError> {
        let (tunnel_tx, tunnel_rx) = tunnel.split::<Message>();
        let (client_rx, client_tx) = tokio::io::split(&mut self.client);

        let uplink = uplink(
            client_rx,
            tunnel_tx,
            &mut self.encryptor,
            &self.idle,
            self.settings.keepalive_interval,
            buf,
        );
        let downlink = downlink(tunnel_rx, client_tx, &mut self.decryptor, &self.idle);

        tokio::select! {
            result = uplink => result,
            result = downlink => result,
        }
    }
}

/// Client to tunnel, with periodic pings
async fn uplink<R, W>(
    mut client_rx: R,
    mut tunnel_tx: W,
    encryptor: &mut Encryptor,
    idle: &IdleTimer,
    keepalive: Duration,
    mut buf: Vec<u8>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: Sink<Message, Error = WsError> + Unpin,
{
    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            read = client_rx.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Err(SessionError::PeerClosed);
                }
                idle.touch();
                let frame = encryptor.encrypt(&buf[..n])?;
                tunnel_tx.send(Message::Binary(frame)).await?;
            }
            _ = ticker.tick() => {
                trace!("Sending tunnel keepalive");
                tunnel_tx.send(Message::Ping(Vec::new())).await?;
            }
        }
    }
}

/// Tunnel to client
async fn downlink<R, W>(
    mut tunnel_rx: R,
    mut client_tx: W,
    decryptor: &mut Decryptor,
    idle: &IdleTimer,
) -> Result<(), SessionError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = next_frame(&mut tunnel_rx).await?;
        idle.touch();
        let plain = decryptor.decrypt(&frame)?;
        if !plain.is_empty() {
            client_tx.write_all(&plain).await?;
        }
    }
}
