//! Game sync daemon binary.
//!
//! Runs the demo games against an in-process simulated chain. Blocks are
//! announced through the in-memory notification transport, so the whole
//! pipeline from notification decoding to state storage is exercised
//! without a chain node.
//!
//! # Examples
//!
//! ```bash
//! # Short run with frequent reorgs and verbose sync logs
//! GAMESYNC_SIM_BLOCKS=50 GAMESYNC_SIM_REORG_EVERY=5 RUST_LOG=gamesync_runtime=debug \
//!     cargo run -p gamesync-daemon
//! ```
mod registry;
mod simulation;
mod tally;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gamesync_runtime::{
    BufferedGameLogic, DaemonConfig, MemoryTransport, SimulatedChain, SyncDaemon,
};

use registry::NameRegistry;
use simulation::{Simulation, SimulationConfig};
use tally::MoveTally;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = DaemonConfig::from_env();
    let sim_config = SimulationConfig::from_env();

    let _guard = setup_logging(&config.log_dir)?;

    tracing::info!("Starting gamesync daemon");
    tracing::info!("Endpoint: {}", config.endpoint);
    match &config.data_dir {
        Some(dir) => tracing::info!("Data directory: {}", dir.display()),
        None => tracing::info!("Data directory: none, state is kept in memory"),
    }
    tracing::info!("Pruning depth: {:?}", config.pruning_depth);

    let chain = Arc::new(SimulatedChain::new(sim_config.chain));
    let transport = MemoryTransport::new();
    let publisher = transport.publisher(config.endpoint.clone());
    let genesis = chain.genesis()?;

    let daemon = SyncDaemon::builder()
        .config(config)
        .transport(Arc::new(transport))
        .chain(chain.clone())
        .game(NameRegistry::new(genesis))
        .game(BufferedGameLogic::new(MoveTally::new(genesis)))
        .build()
        .await?;

    for names in daemon.games() {
        tracing::info!("Serving {} ({}) version {}", names.id, names.name, names.version);
    }

    let mut simulation = Simulation::new(sim_config, chain, publisher);
    tokio::select! {
        result = simulation.run(&daemon) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, stopping"),
    }

    daemon.shutdown().await;
    tracing::info!("Daemon shutdown complete");
    Ok(())
}

/// Setup logging to both stderr and a file in `log_dir`.
///
/// The returned guard flushes the file writer when dropped.
fn setup_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "gamesync.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!("Log directory: {}", log_dir.display());
    Ok(guard)
}
