use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tunnel_proxy::{DialerKind, InstanceConfig, ProxyConfig};

#[derive(Parser)]
#[command(
    name = "tunnel-local",
    about = "Local SOCKS5 front-end for an encrypted tunnel",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "Accepts SOCKS5 CONNECT requests on one or more local ports and forwards each session through its configured upstream server."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address for the first instance (`host:port` or `:port`)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Upstream server endpoint for the first instance
    #[arg(short, long)]
    pub server: Option<String>,

    /// Upstream password for the first instance
    #[arg(short = 'k', long)]
    pub password: Option<String>,

    /// Connect straight to targets instead of through the upstream server
    #[arg(long)]
    pub direct: bool,

    /// Per-read timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub read_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the local proxy (default)
    Run,

    /// Write a default configuration file
    InitConfig {
        /// Where to write the file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration and print the instances it defines
    Check,
}

impl Cli {
    /// Load the config file, if any, then apply command-line overrides
    pub async fn resolve_config(&self) -> Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::load_from_file(path)
                .await
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ProxyConfig::default(),
        };

        let overrides_instance = self.listen.is_some()
            || self.server.is_some()
            || self.password.is_some()
            || self.direct;
        if overrides_instance {
            if config.instances.is_empty() {
                config.instances.push(InstanceConfig::default());
            }
            let instance = &mut config.instances[0];
            if let Some(listen) = &self.listen {
                instance.listen = listen.clone();
            }
            if let Some(server) = &self.server {
                instance.server.endpoint = server.clone();
            }
            if let Some(password) = &self.password {
                instance.server.password = password.clone();
            }
            if self.direct {
                instance.server.dialer = DialerKind::Direct;
            }
        }

        if let Some(secs) = self.read_timeout {
            config.timeouts.read = Duration::from_secs(secs);
        }
        config.diagnostics |= self.verbose;

        Ok(config)
    }
}
