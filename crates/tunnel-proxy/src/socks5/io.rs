//! Timed reads for the negotiation phase

use crate::error::{ProxyError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read until at least `min` bytes are in `buf`, returning how many arrived.
/// Whatever the peer already sent beyond `min` is kept, up to `buf.len()`.
pub(crate) async fn read_at_least<S>(
    stream: &mut S,
    buf: &mut [u8],
    min: usize,
    read_timeout: Duration,
) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < min {
        let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf[filled..])).await {
            Ok(read) => read?,
            Err(_) => return Err(ProxyError::ReadTimeout(read_timeout)),
        };
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }
    Ok(filled)
}

/// Fill `buf` completely
pub(crate) async fn read_full<S>(stream: &mut S, buf: &mut [u8], read_timeout: Duration) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let len = buf.len();
    read_at_least(stream, buf, len, read_timeout).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_at_least_collects_short_reads() {
        let mut stream = Builder::new().read(&[1]).read(&[2, 3, 4]).build();
        let mut buf = [0u8; 8];

        let n = read_at_least(&mut stream, &mut buf, 2, Duration::from_secs(1)).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..n], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_read_at_least_eof() {
        let mut stream = Builder::new().read(&[5]).build();
        let mut buf = [0u8; 8];

        let err = read_at_least(&mut stream, &mut buf, 2, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProxyError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (mut near, _far) = tokio::io::duplex(64);
        let mut buf = [0u8; 4];

        let err = read_full(&mut near, &mut buf, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ProxyError::ReadTimeout(_)));
    }
}
