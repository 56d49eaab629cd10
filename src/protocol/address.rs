//! Address header codec
//!
//! Parses and serializes the destination header
//! `ATYP | (LEN HOST) or (IPv4) | PORT`.

use super::consts::*;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Reasons an address header could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Buffer ends before the declared fields
    #[error("Address header truncated: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes needed from the start of the header
        needed: usize,
        /// Bytes available from the start of the header
        got: usize,
    },

    /// Type byte is not IPv4 or domain name
    #[error("Unsupported address type: {0:#04x}")]
    UnsupportedType(u8),

    /// Domain bytes are not valid UTF-8
    #[error("Domain name is not valid UTF-8")]
    InvalidDomain,
}

/// Supported address types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// Four raw bytes, rendered as a dotted quad
    Ipv4,
    /// Length-prefixed host name
    DomainName,
}

impl AddressType {
    /// Wire value of the type byte
    pub fn to_byte(self) -> u8 {
        match self {
            AddressType::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddressType::DomainName => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }
}

/// A parsed destination header
///
/// Immutable once parsed; `header_len` is the number of bytes the header
/// occupied in the buffer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressHeader {
    address_type: AddressType,
    host: String,
    port: u16,
    header_len: usize,
}

impl AddressHeader {
    /// Build an IPv4 header
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        AddressHeader {
            address_type: AddressType::Ipv4,
            host: ip.to_string(),
            port,
            header_len: MIN_ADDRESS_HEADER_LEN,
        }
    }

    /// Build a domain-name header
    ///
    /// Names longer than 255 bytes cannot be encoded and are truncated to
    /// the length byte's range by `to_bytes`.
    pub fn domain(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let header_len = host.len().min(u8::MAX as usize) + 4;
        AddressHeader {
            address_type: AddressType::DomainName,
            host,
            port,
            header_len,
        }
    }

    /// Parse a header starting at `offset`
    ///
    /// A short buffer or an unknown type is reported as an error rather than
    /// a panic. IPv6 headers are rejected as [`AddressError::UnsupportedType`].
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self, AddressError> {
        let data = buf.get(offset..).unwrap_or_default();
        let atyp = *data.first().ok_or(AddressError::Truncated {
            needed: 1,
            got: 0,
        })?;

        match atyp {
            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = *data.get(1).ok_or(AddressError::Truncated {
                    needed: 2,
                    got: data.len(),
                })? as usize;
                let header_len = len + 4;
                if data.len() < header_len {
                    return Err(AddressError::Truncated {
                        needed: header_len,
                        got: data.len(),
                    });
                }
                let host = std::str::from_utf8(&data[2..2 + len])
                    .map_err(|_| AddressError::InvalidDomain)?
                    .to_string();
                let port = u16::from_be_bytes([data[2 + len], data[3 + len]]);

                Ok(AddressHeader {
                    address_type: AddressType::DomainName,
                    host,
                    port,
                    header_len,
                })
            }

            SOCKS5_ADDR_TYPE_IPV4 => {
                if data.len() < MIN_ADDRESS_HEADER_LEN {
                    return Err(AddressError::Truncated {
                        needed: MIN_ADDRESS_HEADER_LEN,
                        got: data.len(),
                    });
                }
                let ip = Ipv4Addr::new(data[1], data[2], data[3], data[4]);
                let port = u16::from_be_bytes([data[5], data[6]]);

                Ok(AddressHeader::ipv4(ip, port))
            }

            other => Err(AddressError::UnsupportedType(other)),
        }
    }

    /// Address type
    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// Dotted-quad or domain host string
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of bytes the header occupies on the wire
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Serialize the header to its wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header_len);
        bytes.push(self.address_type.to_byte());

        match self.address_type {
            AddressType::Ipv4 => {
                let ip: Ipv4Addr = self.host.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);
                bytes.extend_from_slice(&ip.octets());
            }
            AddressType::DomainName => {
                let host = &self.host.as_bytes()[..self.header_len - 4];
                bytes.push(host.len() as u8);
                bytes.extend_from_slice(host);
            }
        }

        bytes.extend_from_slice(&self.port.to_be_bytes());
        bytes
    }
}

impl fmt::Display for AddressHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
