//! # Omne Validator Node
//!
//! Runs the dual-layer consensus coordinator until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (network preset + environment)
//! 2. Open the slashing-protection store
//! 3. Start the coordinator and its slot tickers
//! 4. Wait for Ctrl+C, then drain and stop

use anyhow::{Context, Result};
use omne_node::{NodeConfig, NodeRuntime};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = NodeConfig::from_env().context("loading configuration")?;

    info!("===========================================");
    info!("  Omne Validator Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let runtime = NodeRuntime::start(config).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    let last = runtime.shutdown().await?;
    info!(
        "Final state: commerce finalized slot {}, security finalized slot {}",
        last.commerce.finalized_slot, last.security.finalized_slot
    );

    Ok(())
}
