//! Upstream tunnel dialing
//!
//! The SOCKS5 front-end only needs a duplex stream that reaches the
//! destination named by a [`RawAddress`]. Encryption and wire framing belong
//! to whatever sits behind [`UpstreamDialer`].

use crate::config::{DialerKind, ServerConfig, TimeoutConfig};
use crate::error::{ProxyError, Result};
use crate::socks5::{RawAddress, TargetAddr};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Any stream a dialer can hand back
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens one upstream stream per session. No pooling, no retries.
#[async_trait]
pub trait UpstreamDialer: Send + Sync {
    async fn dial(&self, target: &RawAddress, server: &ServerConfig) -> Result<BoxedStream>;
}

/// Build the dialer selected for a server
pub fn dialer_for(kind: DialerKind, timeouts: &TimeoutConfig) -> Arc<dyn UpstreamDialer> {
    match kind {
        DialerKind::Relay => Arc::new(RelayDialer::new(timeouts.connect)),
        DialerKind::Direct => Arc::new(DirectDialer::new(timeouts.connect)),
    }
}

/// Connects to the relay endpoint and sends the raw address as the stream
/// header, ahead of the relayed payload.
#[derive(Debug, Clone)]
pub struct RelayDialer {
    connect_timeout: Duration,
}

impl RelayDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl UpstreamDialer for RelayDialer {
    async fn dial(&self, target: &RawAddress, server: &ServerConfig) -> Result<BoxedStream> {
        let mut stream = connect(server.endpoint.as_str(), self.connect_timeout).await?;

        stream
            .write_all(target.as_bytes())
            .await
            .map_err(|e| ProxyError::upstream(format!("{}: {}", server.endpoint, e)))?;

        debug!("Relay {} opened for {}", server.endpoint, target);
        Ok(Box::new(stream))
    }
}

/// Connects straight to the destination; the server entry is ignored.
#[derive(Debug, Clone)]
pub struct DirectDialer {
    connect_timeout: Duration,
}

impl DirectDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl UpstreamDialer for DirectDialer {
    async fn dial(&self, target: &RawAddress, _server: &ServerConfig) -> Result<BoxedStream> {
        let stream = match target.target() {
            TargetAddr::Ip(addr) => connect(addr, self.connect_timeout).await?,
            TargetAddr::Domain(host, port) => {
                connect((host.as_str(), port), self.connect_timeout).await?
            }
        };
        Ok(Box::new(stream))
    }
}

async fn connect<A>(addr: A, connect_timeout: Duration) -> Result<TcpStream>
where
    A: tokio::net::ToSocketAddrs + std::fmt::Debug + Clone,
{
    match tokio::time::timeout(connect_timeout, TcpStream::connect(addr.clone())).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(e)) => Err(ProxyError::upstream(format!("{:?}: {}", addr, e))),
        Err(_) => Err(ProxyError::upstream(format!(
            "{:?}: connect timed out after {:?}",
            addr, connect_timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn server(endpoint: String, dialer: DialerKind) -> ServerConfig {
        ServerConfig {
            endpoint,
            password: String::new(),
            dialer,
        }
    }

    #[tokio::test]
    async fn test_relay_dialer_sends_raw_address_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let target = RawAddress::domain("example.com", 443).unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = vec![0u8; 2 + 11 + 2];
            socket.read_exact(&mut header).await.unwrap();
            let mut payload = [0u8; 4];
            socket.read_exact(&mut payload).await.unwrap();
            (header, payload)
        });

        let dialer = RelayDialer::new(Duration::from_secs(1));
        let mut stream = dialer
            .dial(&target, &server(endpoint, DialerKind::Relay))
            .await
            .unwrap();
        stream.write_all(b"ping").await.unwrap();

        let (header, payload) = accept.await.unwrap();
        assert_eq!(header, target.as_bytes());
        assert_eq!(&payload, b"ping");
    }

    #[tokio::test]
    async fn test_direct_dialer_reaches_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = RawAddress::from(listener.local_addr().unwrap());

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hi").await.unwrap();
        });

        let dialer = dialer_for(DialerKind::Direct, &TimeoutConfig::default());
        let mut stream = dialer
            .dial(&target, &server(String::new(), DialerKind::Direct))
            .await
            .unwrap();

        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_failure_is_upstream_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let dialer = RelayDialer::new(Duration::from_secs(1));
        let target = RawAddress::domain("example.com", 80).unwrap();
        let err = dialer
            .dial(&target, &server(format!("127.0.0.1:{}", port), DialerKind::Relay))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::UpstreamDial(_)));
    }
}
