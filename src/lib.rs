//! # Socksws - SOCKS5 over an encrypted WebSocket tunnel
//!
//! Socksws splits a SOCKS5 proxy into two relays. The local relay exposes a
//! SOCKS5 listener to client applications and forwards each connection over
//! its own WebSocket tunnel. The server relay accepts those tunnels, decrypts
//! the payload and connects to the real destination.
//!
//! ## Features
//!
//! - **SOCKS5 CONNECT**: no-authentication handshake, IPv4 and domain targets
//! - **Stream ciphers**: shadowsocks-compatible framing with rc4-md5, AES-CFB,
//!   AES-CTR and chacha20-ietf
//! - **Ordered pipelining**: data sent before the tunnel is up is queued and
//!   flushed in order
//! - **Backpressure**: each direction waits for its writes before reading more
//! - **Bulk shutdown**: `stop()` force-closes every live session
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksws::{Config, RelayMode, TcpRelay};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let relay = TcpRelay::new(Config::for_mode(RelayMode::Local), RelayMode::Local)?;
//!     relay.init_server().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     relay.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! App -> SOCKS5 -> local relay => ws tunnel => server relay -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod helper;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config, RelayMode};
pub use error::{RelayError, SessionError};
pub use relay::{RelayStatus, TcpRelay};

/// Version of the Socksws library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
