//! hako server binary
//!
//! SFTP server whose filesystem is an object store bucket per account.
//!
//! ## Usage
//!
//! ```bash
//! hako-server --config ~/.config/hako/server.toml
//! RUST_LOG=hako_server=debug,hako_vfs=debug hako-server --config server.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hako_server::{ServerConfig, ServerState, SshServer, SshServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// SFTP server backed by an object store.
#[derive(Parser, Debug)]
#[command(name = "hako-server")]
#[command(about = "SFTP server backed by an object store")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "~/.config/hako/server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run_server(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_server(args: &Args) -> Result<()> {
    let config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    tracing::info!(
        accounts = config.accounts.len(),
        backend = ?config.store.backend,
        "Loaded config"
    );

    let ssh_config = SshServerConfig::from_config(&config).context("preparing SSH config")?;
    let state = ServerState::from_config(&config)
        .await
        .context("preparing server state")?;

    SshServer::new(ssh_config, Arc::new(state)).run().await?;
    Ok(())
}
