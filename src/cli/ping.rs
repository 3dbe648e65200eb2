//! Ping command implementation

use anyhow::{bail, Result};
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::health::{HealthMonitor, HealthStatus};

pub async fn run(config: &Config, once: bool) -> Result<()> {
    let Some(monitor) = HealthMonitor::from_config(&config.health, HealthStatus::new())? else {
        bail!("no health.url configured");
    };

    if once {
        let snapshot = monitor.ping_once().await;
        return super::print_json(&snapshot);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    monitor.run(shutdown_rx).await;
    super::print_json(&monitor.status().snapshot())
}
