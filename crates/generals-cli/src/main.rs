//! Generals session bridge
//!
//! Serves one game per TCP client against the built-in opponents.
//! Configured through `GENERALS_*` environment variables; log level
//! through `RUST_LOG` (default: info).

use anyhow::{Context, Result};
use generals_server::{Bridge, BridgeConfig};
use generals_sim::{ArenaConfig, SimFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;
use tracing_subscriber::EnvFilter;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    let arena = ArenaConfig::from_env().context("invalid arena configuration")?;
    let factory = Arc::new(SimFactory::new(arena));
    let arena = factory.config();
    info!(
        "Starting generals bridge ({}x{} arena, {} turns)",
        arena.height, arena.width, arena.max_turns
    );

    let bridge = Bridge::new(config, factory.clone());
    let addr = bridge.start().await.context("failed to start bridge")?;
    info!(
        "Accepting clients on {} (render mode: {})",
        addr,
        bridge.config().render_mode.as_deref().unwrap_or("off")
    );

    let mut ticker = interval(STATS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("failed to listen for shutdown signal")?;
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let stats = bridge.stats().await;
                info!(
                    "Active clients: {}, active workers: {}",
                    stats.active_clients, stats.active_workers
                );
            }
        }
    }

    bridge.stop().await;
    Ok(())
}
