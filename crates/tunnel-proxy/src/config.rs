//! Local proxy configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// How a session reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialerKind {
    /// Through the relay server named by the endpoint
    Relay,
    /// Straight to the target, bypassing the relay server
    Direct,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Render the target host:port of each request for logging
    pub diagnostics: bool,

    /// Timeout settings shared by every instance
    pub timeouts: TimeoutConfig,

    /// Local proxy instances, each bound to one upstream server
    pub instances: Vec<InstanceConfig>,
}

/// One listening SOCKS5 front-end and the upstream server it forwards to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Name used in log output
    pub name: String,

    /// Listen address, `host:port` or `:port` for all interfaces
    pub listen: String,

    /// Upstream server this instance dials through
    pub server: ServerConfig,
}

/// Upstream endpoint and the credentials handed to the dialer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Relay server address (`host:port`)
    pub endpoint: String,

    /// Shared secret for the tunnel layer
    #[serde(default)]
    pub password: String,

    /// Dialer used for this server
    #[serde(default = "default_dialer")]
    pub dialer: DialerKind,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Applied to every individual socket read
    pub read: Duration,

    /// Upstream connect timeout
    pub connect: Duration,
}

fn default_dialer() -> DialerKind {
    DialerKind::Relay
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            diagnostics: false,
            timeouts: TimeoutConfig::default(),
            instances: vec![InstanceConfig::default()],
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            listen: "127.0.0.1:1080".to_string(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:8388".to_string(),
            password: String::new(),
            dialer: default_dialer(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(300),
            connect: Duration::from_secs(10),
        }
    }
}

impl InstanceConfig {
    /// Resolve the listen address. A bare `:port` binds every interface.
    pub fn listen_address(&self) -> crate::Result<SocketAddr> {
        parse_listen_address(&self.listen)
    }
}

/// Parse `host:port` or `:port` into a bindable socket address
pub fn parse_listen_address(listen: &str) -> crate::Result<SocketAddr> {
    if let Some(port) = listen.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|e| {
            crate::ProxyError::config(format!("Invalid listen port {:?}: {}", port, e))
        })?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    if let Ok(addr) = listen.parse() {
        return Ok(addr);
    }

    listen
        .to_socket_addrs()
        .map_err(|e| crate::ProxyError::config(format!("Invalid listen address {:?}: {}", listen, e)))?
        .next()
        .ok_or_else(|| {
            crate::ProxyError::config(format!("Listen address {:?} did not resolve", listen))
        })
}

impl ProxyConfig {
    /// Check the configuration before any socket is bound
    pub fn validate(&self) -> crate::Result<()> {
        if self.instances.is_empty() {
            return Err(crate::ProxyError::config("No proxy instances configured"));
        }

        for instance in &self.instances {
            instance.listen_address()?;
            if instance.server.dialer == DialerKind::Relay && instance.server.endpoint.is_empty() {
                return Err(crate::ProxyError::config(format!(
                    "Instance {} has no server endpoint",
                    instance.name
                )));
            }
        }

        if self.timeouts.read.is_zero() {
            return Err(crate::ProxyError::config("Read timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn load_from_file(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        toml::from_str(&content)
            .map_err(|e| crate::ProxyError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::ProxyError::config(format!("Failed to serialize config: {}", e)))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
