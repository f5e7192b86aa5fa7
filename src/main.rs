//! Recording proxy
//!
//! Transparent HTTP forwarding proxy that records every completed exchange
//! into a document store.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │               RECORDING PROXY                │
//!  Client request  │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!  ────────────────┼─▶│  http   │──▶│ forward  │──▶│  origin   │──┼──▶ Origin
//!                  │  │ server  │   │ (tee)    │◀──│  client   │◀─┼─── server
//!  ◀───────────────┼──│         │◀──│          │   └───────────┘  │
//!  Client response │  └─────────┘   └────┬─────┘                  │
//!                  │                     │ Exchange (end of body) │
//!                  │                     ▼                        │
//!                  │  ┌──────────────────────────┐  ┌──────────┐  │
//!                  │  │ recorder (bounded queue, │─▶│  store   │──┼──▶ MongoDB
//!                  │  │ single consumer)         │  │          │  │
//!                  │  └──────────────────────────┘  └──────────┘  │
//!                  └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use recording_proxy::config::load_config;
use recording_proxy::lifecycle::startup;
use recording_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "recording-proxy")]
#[command(about = "Transparent HTTP proxy that records exchanges", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, env = "RECORDING_PROXY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward and record traffic (default)
    Run,
    /// Validate configuration and store reachability, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        target = %config.target.host,
        queue_capacity = config.recorder.queue_capacity,
        store = ?config.store.backend,
        "Configuration loaded"
    );

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => startup::run(config).await,
        Commands::Check => startup::check(&config).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Fatal error");
    }
    result.map_err(Into::into)
}
