//! Local SOCKS5 front-end for an encrypted tunnel
//!
//! Accepts SOCKS5 clients, negotiates the no-auth handshake and a CONNECT
//! request, then hands the raw destination address to an upstream dialer
//! and relays bytes both ways until either side closes.

pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod socks5;
pub mod upstream;

pub use config::{DialerKind, InstanceConfig, ProxyConfig, ServerConfig, TimeoutConfig};
pub use error::{ProxyError, Result};
pub use server::{serve, LocalProxy, ProxyServer};
pub use socks5::{RawAddress, Socks5Handler};
pub use upstream::{BoxedStream, UpstreamDialer};
