//! Command-line entry point for every ringstore role.
//!
//! Server roles run until killed; client roles exit when their command
//! script completes. Exit code is non-zero on argument or configuration
//! errors.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use corelib::{DhtConfig, QuorumConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ringstore",
    about = "Chord-style dictionary ring and quorum-replicated file store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the DHT bootstrap coordinator.
    SuperNode { config: PathBuf },
    /// Run ring node `index` from the configuration.
    ChordNode { index: usize, config: PathBuf },
    /// Run the scripted dictionary client.
    DictClient { config: PathBuf },
    /// Run file server `index` (and the coordinator when its entry is
    /// flagged).
    FileServer { index: usize, config: PathBuf },
    /// Run scripted file client `index`.
    FileClient { index: usize, config: PathBuf },
}

/// `RUST_LOG` wins when set; otherwise the config `debug` flag picks
/// the default level.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::SuperNode { config } => {
            let config = DhtConfig::load(config)?;
            init_tracing(config.debug);
            dht::start_bootstrap(&config).await?.await?;
        }
        Command::ChordNode { index, config } => {
            let config = DhtConfig::load(config)?;
            init_tracing(config.debug);
            dht::start_ring_node(&config, index).await?.await?;
        }
        Command::DictClient { config } => {
            let config = DhtConfig::load(config)?;
            init_tracing(config.debug);
            dht::run_dict_client(&config).await?;
        }
        Command::FileServer { index, config } => {
            let config = QuorumConfig::load(config)?;
            init_tracing(config.debug);
            quorum::start_file_server(&config, index).await?.await?;
        }
        Command::FileClient { index, config } => {
            let config = QuorumConfig::load(config)?;
            init_tracing(config.debug);
            quorum::run_file_client(&config, index).await?;
        }
    }
    Ok(())
}
