//! Aria frame bridge: launch the producer and report what arrives.

use std::path::PathBuf;
use std::time::Duration;

use aria_bridge::{Bridge, BridgeConfig, StartOutcome};
use color_eyre::Result;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aria_bridge=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Aria bridge launching...");

    let config_path = std::env::var_os("ARIA_BRIDGE_CONFIG").map(PathBuf::from);
    let config = BridgeConfig::load(config_path.as_deref())?;
    let timeout = config.lifecycle.start_timeout();

    let bridge = Bridge::new(config)?;
    let (mut bridge, outcome) = tokio::task::spawn_blocking(move || {
        let mut bridge = bridge;
        let outcome = bridge.start(timeout);
        (bridge, outcome)
    })
    .await?;
    match outcome? {
        StartOutcome::Ready => info!("bridge ready"),
        StartOutcome::Unconfirmed => warn!("bridge running without a confirmed frame"),
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Some(stats) = bridge.get_stats() {
                    info!(
                        total = stats.store.total_frames(),
                        fps = %stats.store.fps_summary(),
                        pid = ?stats.producer_pid,
                        "bridge stats"
                    );
                }
                if !bridge.is_running() {
                    warn!("bridge is no longer running");
                    break;
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || bridge.stop()).await?;
    info!("Aria bridge stopped");
    Ok(())
}
