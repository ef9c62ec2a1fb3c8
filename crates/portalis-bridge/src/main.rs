//! # portalis-bridge
//!
//! Process host for the bridge's persistent state.
//!
//! On startup it loads every collection snapshot and the sync token (any
//! failure aborts startup), then runs the save loop until Ctrl+C. The
//! Matrix and WhatsApp sides of the bridge attach to the shared
//! [`BridgeStore`] handle.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portalis_shared::constants::APP_NAME;
use portalis_store::{BridgeStore, SaveLoop};

use crate::config::BridgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,portalis_bridge=debug,portalis_store=debug")
            }),
        )
        .init();

    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = BridgeConfig::from_env();
    info!(?config, "Loaded configuration");

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    // -----------------------------------------------------------------------
    // 3. Restore state. Corrupt or unreadable snapshots are fatal.
    // -----------------------------------------------------------------------
    let store = BridgeStore::shared(config.paths.clone());
    let summary = match store.load_all().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Failed to load bridge state");
            return Err(e).context("loading bridge state");
        }
    };
    if summary.full_resync {
        info!("No sync token stored, the next sync starts from scratch");
    }

    // -----------------------------------------------------------------------
    // 4. Spawn the save loop
    // -----------------------------------------------------------------------
    let (stop_tx, stop_rx) = watch::channel(false);
    let save_loop = SaveLoop::new(Arc::clone(&store), config.save_interval).spawn(stop_rx);

    // -----------------------------------------------------------------------
    // 5. Run until shutdown
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");

    let _ = stop_tx.send(true);
    if let Err(e) = save_loop.await {
        error!(error = %e, "Save loop task failed");
    }

    Ok(())
}
