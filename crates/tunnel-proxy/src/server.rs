//! Listener and dispatcher

use crate::{
    config::{InstanceConfig, ProxyConfig},
    error::{ProxyError, Result},
    socks5::Socks5Handler,
    upstream::{dialer_for, UpstreamDialer},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

/// One bound SOCKS5 listener
pub struct LocalProxy {
    listener: TcpListener,
    handler: Socks5Handler,
}

impl LocalProxy {
    /// Bind the listener. Failing here is fatal for the process.
    pub async fn bind(handler: Socks5Handler) -> Result<Self> {
        let addr = handler.instance().listen_address()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ProxyError::config(format!(
                "Failed to bind {} for instance {}: {}",
                addr,
                handler.instance().name,
                e
            ))
        })?;

        info!(
            "Starting local SOCKS5 server {} at {} ...",
            handler.instance().name,
            listener.local_addr()?
        );

        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept forever, one task per connection. Accept errors are logged and
    /// the loop keeps going.
    pub async fn run(self) {
        loop {
            let (socket, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept error on {}: {}", self.handler.instance().name, e);
                    continue;
                }
            };

            let handler = self.handler.clone();
            let span = info_span!("socks5", instance = %handler.instance().name, peer = %peer_addr);

            tokio::spawn(
                async move {
                    debug!("SOCKS5 connection from {}", peer_addr);
                    if let Err(e) = handler.handle_connection(socket).await {
                        debug!("SOCKS5 session from {} ended: {}", peer_addr, e);
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Runs every configured instance side by side
pub struct ProxyServer {
    config: ProxyConfig,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn handler_for(
        &self,
        instance: &InstanceConfig,
        dialer: Arc<dyn UpstreamDialer>,
    ) -> Socks5Handler {
        Socks5Handler::new(
            Arc::new(instance.clone()),
            dialer,
            &self.config.timeouts,
            self.config.diagnostics,
        )
    }

    /// Bind every instance with the dialer its server entry selects
    pub async fn bind(&self) -> Result<Vec<LocalProxy>> {
        let mut proxies = Vec::with_capacity(self.config.instances.len());
        for instance in &self.config.instances {
            let dialer = dialer_for(instance.server.dialer, &self.config.timeouts);
            proxies.push(LocalProxy::bind(self.handler_for(instance, dialer)).await?);
        }
        Ok(proxies)
    }

    /// Bind all instances, then serve them until one of them stops
    pub async fn start(&self) -> Result<()> {
        let proxies = self.bind().await?;
        serve(proxies).await
    }
}

/// Serve already bound proxies. Only returns if a listener task dies.
pub async fn serve(proxies: Vec<LocalProxy>) -> Result<()> {
    let mut tasks = JoinSet::new();
    for proxy in proxies {
        tasks.spawn(proxy.run());
    }

    match tasks.join_next().await {
        Some(Err(e)) => Err(ProxyError::internal(format!("Listener task failed: {}", e))),
        _ => Ok(()),
    }
}
