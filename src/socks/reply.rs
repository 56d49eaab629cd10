//! SOCKS5 reply builder
//!
//! Replies always carry the unspecified IPv4 bind address `0.0.0.0:0`; the
//! real outbound socket lives on the far side of the tunnel.

use crate::protocol::*;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Length of every reply this relay sends
pub const REPLY_LEN: usize = 10;

/// Build reply bytes for `reply_code`
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   |    4     |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn reply_bytes(reply_code: u8) -> [u8; REPLY_LEN] {
    [
        SOCKS5_VERSION,
        reply_code,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Build and send a SOCKS5 reply
pub async fn build_reply<S>(stream: &mut S, reply_code: u8) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&reply_bytes(reply_code)).await?;
    stream.flush().await
}

/// Select "no authentication required"
pub async fn send_greeting<S>(stream: &mut S) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await
}

/// Build a success reply
pub async fn send_success<S>(stream: &mut S) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, SOCKS5_REPLY_SUCCEEDED).await
}

/// Build a "command not supported" reply
pub async fn send_command_not_supported<S>(stream: &mut S) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED).await
}
