//! Protocol constants
//!
//! SOCKS5 values used by the local listener and the address header codec.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (not implemented)
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command (not implemented)
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address (declared by SOCKS5, rejected by this relay)
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
/// Command not supported
pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Smallest possible address header (IPv4: type + 4 + port)
pub const MIN_ADDRESS_HEADER_LEN: usize = 7;

/// Smallest SOCKS5 request the local side accepts
pub const MIN_REQUEST_LEN: usize = 10;

/// Smallest SOCKS5 greeting the local side accepts
pub const MIN_GREETING_LEN: usize = 3;

/// Offset of the address header inside a SOCKS5 request (VER CMD RSV)
pub const REQUEST_HEADER_OFFSET: usize = 3;
