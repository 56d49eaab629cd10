//! SOCKS5 front end for the local side
//!
//! The local session sees the client's bytes chunk by chunk, so greeting and
//! request are parsed from whatever a single read returned rather than from
//! a stream.

mod handshake;
mod reply;

pub use handshake::{parse_greeting, parse_request, SocksCommand, SocksRequest};
pub use reply::{build_reply, reply_bytes, send_command_not_supported, send_greeting, send_success};
