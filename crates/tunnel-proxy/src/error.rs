//! Error types for the local proxy

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Which SOCKS5 frame a framing violation was detected in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Greeting,
    Request,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Greeting => f.write_str("greeting"),
            Phase::Request => f.write_str("request"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SOCKS version not supported: {0}")]
    UnsupportedVersion(u8),

    #[error("SOCKS address type not supported: {0}")]
    UnsupportedAddressType(u8),

    #[error("SOCKS command not supported: {0}")]
    UnsupportedCommand(u8),

    #[error("SOCKS {phase} got extra data: expected {expected} bytes, received {received}")]
    ExtraData {
        phase: Phase,
        expected: usize,
        received: usize,
    },

    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("Upstream connection failed: {0}")]
    UpstreamDial(String),

    #[error("Relay error: {0}")]
    Relay(std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamDial(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
