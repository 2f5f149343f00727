//! trellis-server binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use trellis::config::TrellisConfig;
use trellis_server::{AppState, run_server};

/// Feature-flag dependency service
///
/// Serves the flag API over HTTP. Flags live in SQLite and their history in a
/// JSONL audit log unless the config file says otherwise.
#[derive(Parser, Debug)]
#[command(name = "trellis-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file. Relative paths inside it resolve against its directory.
    #[arg(short, long, env = "TRELLIS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file.
    #[arg(short, long, env = "TRELLIS_BIND")]
    bind: Option<String>,
}

async fn load_config(path: Option<&Path>) -> Result<(TrellisConfig, PathBuf)> {
    match path {
        Some(path) => {
            let config = TrellisConfig::load(path)
                .await
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            let base_dir = path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            Ok((config, base_dir))
        }
        None => {
            let base_dir = std::env::current_dir().context("failed to read working directory")?;
            Ok((TrellisConfig::default(), base_dir))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides, e.g. RUST_LOG=trellis=debug,tower_http=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trellis=info,trellis_server=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let (config, base_dir) = load_config(args.config.as_deref()).await?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    tracing::info!(
        storage = %config.storage.backend,
        audit = %config.audit.backend,
        "Starting trellis-server"
    );
    let state = AppState::from_config(&config, &base_dir)
        .await
        .context("failed to open backends")?;

    run_server(state, &bind).await?;
    Ok(())
}
