//! SOCKS5 address encoding
//!
//! A [`RawAddress`] is the `ATYP | DST.ADDR | DST.PORT` slice of a CONNECT
//! request, kept byte for byte as the client sent it. The upstream dialer
//! receives it unchanged.

use crate::error::{Phase, ProxyError, Result};
use bytes::Bytes;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Version, command and reserved bytes that precede the address in a request
pub const REQUEST_PREFIX_LEN: usize = 3;

/// SOCKS5 address type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl TryFrom<u8> for AddressType {
    type Error = ProxyError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Ipv4),
            0x03 => Ok(Self::Domain),
            0x04 => Ok(Self::Ipv6),
            _ => Err(ProxyError::UnsupportedAddressType(value)),
        }
    }
}

impl AddressType {
    /// Length of the encoded address from the type byte through the port.
    /// `domain_len` is the byte right after the type byte and only matters
    /// for domain names.
    pub fn encoded_len(self, domain_len: u8) -> usize {
        match self {
            Self::Ipv4 => 1 + 4 + 2,
            Self::Ipv6 => 1 + 16 + 2,
            Self::Domain => 1 + 1 + domain_len as usize + 2,
        }
    }

    /// Total length of a CONNECT request carrying this address type
    pub fn request_len(self, domain_len: u8) -> usize {
        REQUEST_PREFIX_LEN + self.encoded_len(domain_len)
    }
}

fn truncated() -> ProxyError {
    ProxyError::Io(std::io::ErrorKind::UnexpectedEof.into())
}

/// Decoded destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "{}", addr),
            Self::Domain(host, port) if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Self::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Wire-format destination address, immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAddress(Bytes);

impl RawAddress {
    /// Take an encoded address whose length must match its type exactly
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let atyp = *buf.first().ok_or_else(truncated)?;
        let kind = AddressType::try_from(atyp)?;
        let domain_len = buf.get(1).copied().unwrap_or(0);
        let expected = kind.encoded_len(domain_len);

        if buf.len() < expected {
            return Err(truncated());
        }
        if buf.len() > expected {
            return Err(ProxyError::ExtraData {
                phase: Phase::Request,
                expected,
                received: buf.len(),
            });
        }

        Ok(Self(Bytes::copy_from_slice(buf)))
    }

    /// Encode a domain name target
    pub fn domain(host: &str, port: u16) -> Result<Self> {
        let len = u8::try_from(host.len())
            .map_err(|_| ProxyError::config(format!("Domain name too long: {}", host.len())))?;

        let mut buf = Vec::with_capacity(AddressType::Domain.encoded_len(len));
        buf.push(AddressType::Domain as u8);
        buf.push(len);
        buf.extend_from_slice(host.as_bytes());
        buf.extend_from_slice(&port.to_be_bytes());
        Ok(Self(Bytes::from(buf)))
    }

    pub fn address_type(&self) -> AddressType {
        // Construction guarantees a valid type byte
        match self.0[0] {
            0x01 => AddressType::Ipv4,
            0x04 => AddressType::Ipv6,
            _ => AddressType::Domain,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Destination port, the trailing big-endian pair
    pub fn port(&self) -> u16 {
        let n = self.0.len();
        u16::from_be_bytes([self.0[n - 2], self.0[n - 1]])
    }

    /// Decode into a socket address or a domain name
    pub fn target(&self) -> TargetAddr {
        let port = self.port();
        let body = &self.0[1..self.0.len() - 2];
        match self.address_type() {
            AddressType::Ipv4 => {
                let octets: [u8; 4] = body.try_into().unwrap_or_default();
                TargetAddr::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
            }
            AddressType::Ipv6 => {
                let octets: [u8; 16] = body.try_into().unwrap_or_default();
                TargetAddr::Ip(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
            }
            AddressType::Domain => {
                TargetAddr::Domain(String::from_utf8_lossy(&body[1..]).into_owned(), port)
            }
        }
    }

    /// Diagnostic `host:port` rendering
    pub fn host(&self) -> String {
        self.target().to_string()
    }
}

impl From<SocketAddr> for RawAddress {
    fn from(addr: SocketAddr) -> Self {
        let mut buf = Vec::with_capacity(19);
        match addr.ip() {
            IpAddr::V4(ip) => {
                buf.push(AddressType::Ipv4 as u8);
                buf.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                buf.push(AddressType::Ipv6 as u8);
                buf.extend_from_slice(&ip.octets());
            }
        }
        buf.extend_from_slice(&addr.port().to_be_bytes());
        Self(Bytes::from(buf))
    }
}

impl AsRef<[u8]> for RawAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_request_lengths() {
        assert_eq!(AddressType::Ipv4.request_len(0), 10);
        assert_eq!(AddressType::Ipv6.request_len(0), 22);
        assert_eq!(AddressType::Domain.request_len(11), 3 + 1 + 1 + 11 + 2);
        assert_eq!(AddressType::Domain.request_len(255), 262);
    }

    #[test]
    fn test_unsupported_address_type() {
        assert!(matches!(
            AddressType::try_from(0x02),
            Err(ProxyError::UnsupportedAddressType(0x02))
        ));
        assert!(matches!(
            RawAddress::parse(&[0x05, 1, 2, 3, 4, 0, 80]),
            Err(ProxyError::UnsupportedAddressType(0x05))
        ));
    }

    #[test]
    fn test_ipv4_host() {
        let raw = RawAddress::parse(&[0x01, 93, 184, 216, 34, 0x00, 0x50]).unwrap();
        assert_eq!(raw.len(), 7);
        assert_eq!(raw.address_type(), AddressType::Ipv4);
        assert_eq!(raw.port(), 80);
        assert_eq!(raw.host(), "93.184.216.34:80");
    }

    #[test]
    fn test_domain_host() {
        let mut buf = vec![0x03, 11];
        buf.extend_from_slice(b"example.com");
        buf.extend_from_slice(&443u16.to_be_bytes());

        let raw = RawAddress::parse(&buf).unwrap();
        assert_eq!(raw.host(), "example.com:443");
        assert_eq!(raw, RawAddress::domain("example.com", 443).unwrap());
        assert_eq!(raw.target(), TargetAddr::Domain("example.com".to_string(), 443));
    }

    #[test]
    fn test_ipv6_host() {
        let addr: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        let raw = RawAddress::from(addr);
        assert_eq!(raw.len(), 19);
        assert_eq!(raw.address_type(), AddressType::Ipv6);
        assert_eq!(raw.host(), "[2001:db8::1]:8080");
        assert_eq!(raw.target(), TargetAddr::Ip(addr));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(RawAddress::parse(&[0x01, 127, 0, 0, 1, 0]).is_err());
        assert!(RawAddress::parse(&[0x01, 127, 0, 0, 1, 0, 80, 0]).is_err());
        assert!(RawAddress::parse(&[]).is_err());
    }

    #[test]
    fn test_domain_too_long() {
        let host = "a".repeat(256);
        assert!(RawAddress::domain(&host, 80).is_err());
    }

    proptest! {
        #[test]
        fn prop_ipv4_host_matches_bytes(octets in any::<[u8; 4]>(), port in any::<u16>()) {
            let mut buf = vec![0x01];
            buf.extend_from_slice(&octets);
            buf.extend_from_slice(&port.to_be_bytes());

            let raw = RawAddress::parse(&buf).unwrap();
            prop_assert_eq!(raw.as_bytes(), &buf[..]);
            prop_assert_eq!(raw.host(), format!("{}:{}", Ipv4Addr::from(octets), port));
        }

        #[test]
        fn prop_domain_roundtrip(host in "[a-z0-9]{1,20}(\\.[a-z]{2,6}){0,3}", port in any::<u16>()) {
            let raw = RawAddress::domain(&host, port).unwrap();
            prop_assert_eq!(raw.len(), AddressType::Domain.encoded_len(host.len() as u8));
            prop_assert_eq!(raw.port(), port);
            prop_assert_eq!(raw.host(), format!("{}:{}", host, port));
        }
    }
}
