//! Periodic self-ping and the process-wide status it maintains

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::HealthConfig;

/// Snapshot of the most recent ping outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Shared ping bookkeeping; clone the `Arc` to read it from elsewhere
#[derive(Debug, Default)]
pub struct HealthStatus {
    inner: RwLock<HealthSnapshot>,
}

impl HealthStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, at: DateTime<Utc>) {
        self.inner.write().last_request_at = Some(at);
    }

    /// A successful response clears any earlier error
    pub fn record_success(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.last_response_at = Some(at);
        inner.last_error = None;
        inner.last_error_at = None;
    }

    pub fn record_failure(&self, error: impl Into<String>, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.last_error = Some(error.into());
        inner.last_error_at = Some(at);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().clone()
    }
}

pub struct HealthMonitor {
    url: String,
    interval: Duration,
    client: reqwest::Client,
    status: Arc<HealthStatus>,
}

impl HealthMonitor {
    /// `None` when no ping URL is configured
    pub fn from_config(config: &HealthConfig, status: Arc<HealthStatus>) -> reqwest::Result<Option<Self>> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Some(Self {
            url,
            interval: config.interval(),
            client,
            status,
        }))
    }

    pub fn status(&self) -> Arc<HealthStatus> {
        self.status.clone()
    }

    fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// One ping; the outcome lands in the shared status
    pub async fn ping_once(&self) -> HealthSnapshot {
        self.status.record_request(Utc::now());

        let outcome = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match outcome {
            Ok(response) => {
                info!(url = %self.url, status = %response.status(), "health_ping_ok");
                self.status.record_success(Utc::now());
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "health_ping_failed");
                self.status.record_failure(e.to_string(), Utc::now());
            }
        }

        self.status.snapshot()
    }

    /// Ping immediately, then every interval until shutdown flips to true or
    /// the shutdown sender goes away. A slow ping delays the next one instead
    /// of triggering catch-up pings.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.ping_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("health_monitor_stopped");
                        break;
                    }
                }
            }
        }
    }
}
