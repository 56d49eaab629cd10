//! Error types for Socksws
//!
//! This module defines the relay-level and per-session error types.

use crate::crypto::CipherError;
use crate::protocol::AddressError;
use crate::session::PendingError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for relay (listener-level) operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// `init_server` was called on a relay that is already listening
    #[error("Relay is already running on {0}")]
    AlreadyRunning(SocketAddr),
}

impl From<CipherError> for RelayError {
    fn from(err: CipherError) -> Self {
        RelayError::Config(err.to_string())
    }
}

/// Errors that terminate a single session
///
/// Every variant is terminal: the session tears down both of its transports
/// and nothing is reported beyond the log line written by the listener.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The SOCKS5 greeting was shorter than 3 bytes or not version 5
    #[error("Malformed SOCKS5 greeting")]
    MalformedGreeting,

    /// The SOCKS5 request or the first tunnel frame could not be parsed
    #[error("Malformed request")]
    MalformedRequest,

    /// The address header named a type other than IPv4 or domain name
    #[error("Address type not supported: {0:#04x}")]
    UnsupportedAddressType(u8),

    /// The SOCKS5 command was not CONNECT
    #[error("Command not supported: {0:#04x}")]
    UnsupportedCommand(u8),

    /// The WebSocket tunnel to the relay server could not be opened
    #[error("Tunnel connect failed: {0}")]
    TunnelConnect(#[source] Box<tungstenite::Error>),

    /// The destination host could not be reached
    #[error("Failed to connect to {target}: {source}")]
    DestinationConnect {
        /// `host:port` that was dialed
        target: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Stream socket error on either side
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The HTTP front failed before a tunnel was accepted
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// WebSocket error on an established tunnel
    #[error("Tunnel error: {0}")]
    Tunnel(#[source] Box<tungstenite::Error>),

    /// Cipher failure while processing a frame
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Pending-data queue misuse
    #[error("Pending queue error: {0}")]
    Pending(#[from] PendingError),

    /// No traffic was seen for the configured idle period
    #[error("Idle timeout")]
    IdleTimeout,

    /// The peer closed its side of the session
    #[error("Peer closed the connection")]
    PeerClosed,

    /// A stage change not allowed by the transition table
    #[error("Illegal stage transition: {from} -> {to}")]
    IllegalTransition {
        /// Stage the session was in
        from: &'static str,
        /// Stage that was requested
        to: &'static str,
    },
}

impl SessionError {
    /// Whether this is an ordinary end of session rather than a failure
    pub fn is_graceful(&self) -> bool {
        match self {
            SessionError::PeerClosed => true,
            SessionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            SessionError::Tunnel(e) => matches!(
                **e,
                tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Protocol(
                        tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
                    )
            ),
            SessionError::Http(e) => e.is_incomplete_message() || e.is_closed(),
            _ => false,
        }
    }
}

impl From<tungstenite::Error> for SessionError {
    fn from(err: tungstenite::Error) -> Self {
        SessionError::Tunnel(Box::new(err))
    }
}

impl From<AddressError> for SessionError {
    fn from(err: AddressError) -> Self {
        match err {
            AddressError::UnsupportedType(atyp) => SessionError::UnsupportedAddressType(atyp),
            AddressError::Truncated { .. } | AddressError::InvalidDomain => {
                SessionError::MalformedRequest
            }
        }
    }
}
