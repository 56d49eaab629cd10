//! Wire protocol shared by both ends of the tunnel
//!
//! The destination of every session travels as a SOCKS5-style address
//! header: inside the SOCKS5 request on the local side and at the front of
//! the first tunnel frame on the server side.

mod address;
mod consts;

pub use address::{AddressError, AddressHeader, AddressType};
pub use consts::*;
