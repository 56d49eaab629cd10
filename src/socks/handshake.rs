//! SOCKS5 greeting and request parsing

use crate::error::SessionError;
use crate::protocol::*;
use std::fmt;

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND (rejected)
    Bind,
    /// UDP ASSOCIATE (rejected)
    UdpAssociate,
    /// Any other command byte
    Unknown(u8),
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => SocksCommand::Connect,
            SOCKS5_CMD_TCP_BIND => SocksCommand::Bind,
            SOCKS5_CMD_UDP_ASSOCIATE => SocksCommand::UdpAssociate,
            other => SocksCommand::Unknown(other),
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
            SocksCommand::Unknown(byte) => byte,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
            SocksCommand::Unknown(byte) => write!(f, "UNKNOWN({:#04x})", byte),
        }
    }
}

/// A parsed SOCKS5 request chunk
///
/// ```text
/// +----+-----+-------+------+----------+----------+---------
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT | payload
/// +----+-----+-------+------+----------+----------+---------
/// | 1  |  1  | X'00' |  1   | Variable |    2     | 0..
/// +----+-----+-------+------+----------+----------+---------
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    /// Requested command
    pub command: SocksCommand,
    /// Destination address header
    pub header: AddressHeader,
}

impl SocksRequest {
    /// Offset of the first byte after the address header
    pub fn header_end(&self) -> usize {
        REQUEST_HEADER_OFFSET + self.header.header_len()
    }
}

/// Validate the method-selection greeting
///
/// Only the version and minimum length are checked; the offered methods are
/// ignored and "no authentication" is always selected.
pub fn parse_greeting(buf: &[u8]) -> Result<(), SessionError> {
    if buf.len() < MIN_GREETING_LEN || buf[0] != SOCKS5_VERSION {
        return Err(SessionError::MalformedGreeting);
    }
    Ok(())
}

/// Parse a request chunk
///
/// The address header is parsed before the command is looked at, so a
/// request with both a bad header and a bad command is a malformed request
/// and gets no reply.
pub fn parse_request(buf: &[u8]) -> Result<SocksRequest, SessionError> {
    if buf.len() < MIN_REQUEST_LEN || buf[0] != SOCKS5_VERSION {
        return Err(SessionError::MalformedRequest);
    }

    let header = AddressHeader::parse(buf, REQUEST_HEADER_OFFSET)?;
    let command = SocksCommand::from_byte(buf[1]);

    Ok(SocksRequest { command, header })
}
