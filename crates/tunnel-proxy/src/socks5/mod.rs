//! SOCKS5 front-end (RFC 1928), CONNECT only with no authentication

mod address;
mod handler;
mod handshake;
mod io;
mod request;

pub use address::{AddressType, RawAddress, TargetAddr};
pub use handler::{SessionState, Socks5Handler};
pub use handshake::negotiate;
pub use request::{read_request, Socks5Request};

/// Protocol version byte carried by every SOCKS5 frame
pub const SOCKS_VERSION: u8 = 0x05;

/// The only method this proxy offers: no authentication required
pub const METHOD_NO_AUTH: u8 = 0x00;

/// Success reply sent as soon as a request parses, before the upstream dial.
/// Bound address 0.0.0.0, bound port is a fixed placeholder.
pub const CONNECTION_ESTABLISHED: [u8; 10] =
    [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x08, 0x43];

/// SOCKS5 command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Connect),
            0x02 => Some(Self::Bind),
            0x03 => Some(Self::UdpAssociate),
            _ => None,
        }
    }
}
