use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process;
use tracing::info;
use tunnel_proxy::{serve, ProxyConfig, ProxyServer};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command.clone() {
        Some(Commands::InitConfig { path, force }) => {
            if path.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", path.display());
            }
            ProxyConfig::default()
                .save_to_file(&path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Some(Commands::Check) => {
            let config = cli.resolve_config().await?;
            config.validate()?;
            for instance in &config.instances {
                println!(
                    "{}: {} -> {} ({:?})",
                    instance.name,
                    instance.listen_address()?,
                    instance.server.endpoint,
                    instance.server.dialer
                );
            }
            Ok(())
        }
        Some(Commands::Run) | None => run(cli.resolve_config().await?).await,
    }
}

async fn run(config: ProxyConfig) -> Result<()> {
    let server = ProxyServer::new(config).context("Invalid configuration")?;
    let proxies = server.bind().await.context("Failed to start listeners")?;

    tokio::select! {
        result = serve(proxies) => result.context("Proxy stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    if quiet {
        return;
    }

    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
