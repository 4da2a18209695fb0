//! SOCKS5 connection handler

use super::{negotiate, read_request, CONNECTION_ESTABLISHED};
use crate::{
    config::{InstanceConfig, TimeoutConfig},
    error::Result,
    relay::relay,
    upstream::UpstreamDialer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Where a session stands. `Closed` is reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Handshaking,
    RequestParsed,
    ConfirmationSent,
    Relaying,
    Closed,
}

struct Session {
    state: SessionState,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Accepted,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Runs one SOCKS5 session per accepted client
#[derive(Clone)]
pub struct Socks5Handler {
    instance: Arc<InstanceConfig>,
    dialer: Arc<dyn UpstreamDialer>,
    read_timeout: Duration,
    diagnostics: bool,
}

impl Socks5Handler {
    pub fn new(
        instance: Arc<InstanceConfig>,
        dialer: Arc<dyn UpstreamDialer>,
        timeouts: &TimeoutConfig,
        diagnostics: bool,
    ) -> Self {
        Self {
            instance,
            dialer,
            read_timeout: timeouts.read,
            diagnostics,
        }
    }

    pub fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    /// Drive a client through handshake, request, confirmation, dial and
    /// relay. The client stream, and the upstream once dialed, are closed
    /// when this returns, on success and on every error path.
    ///
    /// On success returns the last state reached before closing.
    pub async fn handle_connection<S>(&self, client: S) -> Result<SessionState>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut session = Session::new();
        let result = self.run(client, &mut session).await;
        let reached = session.state;
        session.advance(SessionState::Closed);
        result.map(|()| reached)
    }

    async fn run<S>(&self, mut client: S, session: &mut Session) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        session.advance(SessionState::Handshaking);
        if let Err(e) = negotiate(&mut client, self.read_timeout).await {
            warn!("SOCKS5 handshake failed: {}", e);
            return Err(e);
        }

        let request = match read_request(&mut client, self.read_timeout, self.diagnostics).await {
            Ok(request) => request,
            Err(e) => {
                warn!("Error getting SOCKS5 request: {}", e);
                return Err(e);
            }
        };
        session.advance(SessionState::RequestParsed);
        if let Some(host) = &request.host {
            debug!("SOCKS5 CONNECT to {}", host);
        }

        // Confirm before dialing to save a round trip. A failed dial then
        // shows up on the client as a reset rather than a SOCKS5 error reply.
        if let Err(e) = client.write_all(&CONNECTION_ESTABLISHED).await {
            debug!("Failed to send connection confirmation: {}", e);
            return Err(e.into());
        }
        session.advance(SessionState::ConfirmationSent);

        let upstream = match self.dialer.dial(&request.raw, &self.instance.server).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(
                    "Error connecting to upstream {} for {}: {}",
                    self.instance.server.endpoint, request.raw, e
                );
                return Err(e);
            }
        };
        session.advance(SessionState::Relaying);

        let stats = relay(client, upstream, self.read_timeout).await;
        match &stats {
            Ok(stats) => debug!(
                "Closed connection to {} ({} bytes up, {} bytes down)",
                request.raw, stats.upload, stats.download
            ),
            Err(e) => debug!("Closed connection to {}: {}", request.raw, e),
        }
        stats.map(|_| ())
    }
}
