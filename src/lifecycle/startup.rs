//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the record store and prove it answers
//! - Start the metrics exporter when enabled
//! - Bind the listener, start the recorder, serve
//! - On shutdown, drain the server first and the recorder second
//!
//! # Design Decisions
//! - Fail fast: an unreachable store or an unbindable address is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener is bound last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time;

use crate::config::{ConfigError, ProxyConfig, StoreBackend, StoreConfig};
use crate::http::{HttpServer, TargetError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::shutdown_signal;
use crate::observability::metrics;
use crate::recording::{ExchangeSink, Recorder};
use crate::store::{LogStore, MongoStore, RecordStore, StoreError};

/// Error type for startup. Every variant is fatal.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid target: {0}")]
    Target(#[from] TargetError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Store did not answer within {0:?}")]
    StoreTimeout(Duration),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Connect the configured store and check that it answers.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StartupError> {
    let store: Arc<dyn RecordStore> = match config.backend {
        StoreBackend::Mongodb => {
            let store = MongoStore::connect(&config.mongodb).await?;
            let limit = Duration::from_secs(config.mongodb.connect_timeout_secs);
            time::timeout(limit, store.check_reachable())
                .await
                .map_err(|_| StartupError::StoreTimeout(limit))??;
            Arc::new(store)
        }
        StoreBackend::Log => {
            tracing::warn!("Records go to the log, nothing is persisted");
            Arc::new(LogStore::new())
        }
    };

    tracing::info!(backend = ?config.backend, "Record store reachable");
    Ok(store)
}

/// Verify configuration and store reachability without serving.
pub async fn check(config: &ProxyConfig) -> Result<(), StartupError> {
    HttpServer::new(config, Vec::new())?;
    let store = connect_store(&config.store).await?;
    store.close().await;
    tracing::info!("Configuration and store check passed");
    Ok(())
}

/// Start every subsystem and serve until SIGINT or SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let store = connect_store(&config.store).await?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    serve(&config, store, listener, &shutdown).await
}

/// Serve on an already bound listener, persisting into `store`, until
/// `shutdown` fires. The recorder is stopped (and the store closed) before
/// this returns.
pub async fn serve(
    config: &ProxyConfig,
    store: Arc<dyn RecordStore>,
    listener: TcpListener,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let signal = shutdown.subscribe();
    let recorder = Arc::new(Recorder::new(store, &config.recorder));
    let server = HttpServer::new(config, vec![recorder.clone() as Arc<dyn ExchangeSink>])?;

    recorder.start();
    let served = server.run(listener, signal).await;
    recorder.stop().await;

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
