//! Bidirectional relay between a client and its upstream stream
//!
//! Each direction copies until EOF, error or read timeout, then closes the
//! session through a shared [`Teardown`]. Whichever direction finishes first
//! cancels the other; half-closed connections are not kept open.

use crate::error::{ProxyError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const RELAY_BUFFER_SIZE: usize = 8192;

/// Session close guard shared by both relay directions
#[derive(Debug, Default)]
pub struct Teardown {
    closed: AtomicBool,
    token: CancellationToken,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the session. Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once [`Teardown::close`] has been called
    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

/// Bytes moved in each direction over a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub upload: u64,
    pub download: u64,
}

/// Copy `src` into `dst` until either side stops, then close the session
/// and shut down `dst`.
pub async fn pipe_then_close<R, W>(
    mut src: R,
    mut dst: W,
    read_timeout: Duration,
    teardown: Arc<Teardown>,
    direction: &'static str,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total_bytes = 0u64;

    let result = loop {
        let n = tokio::select! {
            _ = teardown.closed() => break Ok(()),
            read = tokio::time::timeout(read_timeout, src.read(&mut buffer)) => match read {
                Ok(Ok(0)) => break Ok(()),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => break Err(ProxyError::Relay(e)),
                Err(_) => break Err(ProxyError::ReadTimeout(read_timeout)),
            },
        };

        let written = tokio::select! {
            _ = teardown.closed() => break Ok(()),
            written = dst.write_all(&buffer[..n]) => written,
        };
        if let Err(e) = written {
            break Err(ProxyError::Relay(e));
        }

        total_bytes += n as u64;
    };

    teardown.close();
    let _ = dst.shutdown().await;

    match &result {
        Ok(()) => debug!("Relay {} closed after {} bytes", direction, total_bytes),
        Err(e) => debug!("Relay {} failed after {} bytes: {}", direction, total_bytes, e),
    }

    result.map(|()| total_bytes)
}

/// Relay between `client` and `upstream` until either direction ends.
///
/// Upstream-to-client runs as a spawned task; client-to-upstream runs on the
/// caller's task. Both streams are dropped, and so closed, before this
/// returns.
pub async fn relay<C, U>(client: C, upstream: U, read_timeout: Duration) -> Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (upstream_reader, upstream_writer) = tokio::io::split(upstream);
    let teardown = Arc::new(Teardown::new());

    let upstream_to_client = tokio::spawn(pipe_then_close(
        upstream_reader,
        client_writer,
        read_timeout,
        teardown.clone(),
        "upstream->client",
    ));

    let upload = pipe_then_close(
        client_reader,
        upstream_writer,
        read_timeout,
        teardown.clone(),
        "client->upstream",
    )
    .await;

    let download = match upstream_to_client.await {
        Ok(result) => result,
        Err(e) => {
            error!("Upstream to client task failed: {}", e);
            Err(ProxyError::internal(format!("Relay task join error: {}", e)))
        }
    };

    Ok(RelayStats {
        upload: upload?,
        download: download?,
    })
}
