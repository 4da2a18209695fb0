//! CONNECT request parsing

use super::address::{AddressType, RawAddress, REQUEST_PREFIX_LEN};
use super::io::{read_at_least, read_full};
use super::{Command, SOCKS_VERSION};
use crate::error::{Phase, ProxyError, Result};
use std::time::Duration;
use tokio::io::AsyncRead;

/// Large enough for the longest domain-name request (262 bytes)
const REQUEST_BUF_LEN: usize = 263;

/// Enough to see the address type and a domain length byte
const REQUEST_MIN_LEN: usize = REQUEST_PREFIX_LEN + 2;

/// Parsed CONNECT request
#[derive(Debug, Clone)]
pub struct Socks5Request {
    /// Destination exactly as sent, handed to the upstream dialer
    pub raw: RawAddress,
    /// `host:port`, rendered only when diagnostics are on
    pub host: Option<String>,
}

/// Read a CONNECT request and extract its destination address.
///
/// Checks run in wire order: version, then command, then address type, so
/// a BIND or UDP ASSOCIATE request fails before its address is looked at.
pub async fn read_request<S>(
    stream: &mut S,
    read_timeout: Duration,
    diagnostics: bool,
) -> Result<Socks5Request>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_BUF_LEN];

    let n = read_at_least(stream, &mut buf, REQUEST_MIN_LEN, read_timeout).await?;
    if buf[0] != SOCKS_VERSION {
        return Err(ProxyError::UnsupportedVersion(buf[0]));
    }
    if Command::from_byte(buf[1]) != Some(Command::Connect) {
        return Err(ProxyError::UnsupportedCommand(buf[1]));
    }

    let atyp = AddressType::try_from(buf[REQUEST_PREFIX_LEN])?;
    let req_len = atyp.request_len(buf[REQUEST_PREFIX_LEN + 1]);

    if n < req_len {
        read_full(stream, &mut buf[n..req_len], read_timeout).await?;
    } else if n > req_len {
        return Err(ProxyError::ExtraData {
            phase: Phase::Request,
            expected: req_len,
            received: n,
        });
    }

    let raw = RawAddress::parse(&buf[REQUEST_PREFIX_LEN..req_len])?;
    let host = diagnostics.then(|| raw.host());

    Ok(Socks5Request { raw, host })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn connect_request(addr: &[u8]) -> Vec<u8> {
        let mut req = vec![5, 1, 0];
        req.extend_from_slice(addr);
        req
    }

    #[tokio::test]
    async fn test_ipv4_request() {
        let addr = [1, 93, 184, 216, 34, 0, 80];
        let mut stream = Builder::new().read(&connect_request(&addr)).build();

        let request = read_request(&mut stream, TIMEOUT, true).await.unwrap();
        assert_eq!(request.raw.as_bytes(), &addr);
        assert_eq!(request.host.as_deref(), Some("93.184.216.34:80"));
    }

    #[tokio::test]
    async fn test_domain_request_split_across_reads() {
        let mut addr = vec![3, 11];
        addr.extend_from_slice(b"example.com");
        addr.extend_from_slice(&443u16.to_be_bytes());
        let req = connect_request(&addr);

        let mut stream = Builder::new().read(&req[..6]).read(&req[6..]).build();

        let request = read_request(&mut stream, TIMEOUT, true).await.unwrap();
        assert_eq!(request.raw.as_bytes(), &addr[..]);
        assert_eq!(request.host.as_deref(), Some("example.com:443"));
    }

    #[tokio::test]
    async fn test_ipv6_request() {
        let mut addr = vec![4];
        addr.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        addr.extend_from_slice(&[0x1f, 0x90]);
        let mut stream = Builder::new().read(&connect_request(&addr)).build();

        let request = read_request(&mut stream, TIMEOUT, true).await.unwrap();
        assert_eq!(request.raw.len(), 19);
        assert_eq!(request.host.as_deref(), Some("[2001:db8::1]:8080"));
    }

    #[tokio::test]
    async fn test_host_skipped_without_diagnostics() {
        let mut stream = Builder::new().read(&connect_request(&[1, 10, 0, 0, 1, 0, 22])).build();

        let request = read_request(&mut stream, TIMEOUT, false).await.unwrap();
        assert!(request.host.is_none());
        assert_eq!(request.raw.port(), 22);
    }

    #[tokio::test]
    async fn test_rejects_bind_before_address() {
        // Address type 0x09 would fail too, the command is checked first
        let mut stream = Builder::new().read(&[5, 2, 0, 9, 0]).build();
        let err = read_request(&mut stream, TIMEOUT, false).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedCommand(2)));
    }

    #[tokio::test]
    async fn test_rejects_udp_associate() {
        let mut stream = Builder::new().read(&[5, 3, 0, 1, 0, 0, 0, 0, 0, 0]).build();
        let err = read_request(&mut stream, TIMEOUT, false).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedCommand(3)));
    }

    #[tokio::test]
    async fn test_rejects_wrong_version() {
        let mut stream = Builder::new().read(&[4, 1, 0, 1, 127]).build();
        let err = read_request(&mut stream, TIMEOUT, false).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedVersion(4)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_address_type() {
        let mut stream = Builder::new().read(&[5, 1, 0, 2, 0]).build();
        let err = read_request(&mut stream, TIMEOUT, false).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedAddressType(2)));
    }

    #[tokio::test]
    async fn test_rejects_trailing_bytes() {
        let mut req = connect_request(&[1, 127, 0, 0, 1, 0, 80]);
        req.push(0xFF);
        let mut stream = Builder::new().read(&req).build();

        let err = read_request(&mut stream, TIMEOUT, false).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::ExtraData {
                phase: Phase::Request,
                expected: 10,
                received: 11
            }
        ));
    }
}
