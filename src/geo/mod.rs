//! Geolocation enrichment
//!
//! Providers perform the actual lookup and may fail; `GeoEnrichment` wraps a
//! provider and turns every failure into the "Unknown" tuple so the visit
//! write path never aborts because of it.

mod ipapi;

pub use ipapi::IpApiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::address;
use crate::config::GeoConfig;

/// Placeholder for missing, failed or unparsable data.
pub const UNKNOWN: &str = "Unknown";

/// Resolved location of a client address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
    pub region: String,
    pub isp: String,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            isp: UNKNOWN.to_string(),
        }
    }

    /// True when no field was resolved
    pub fn is_unknown(&self) -> bool {
        [&self.country, &self.city, &self.region, &self.isp]
            .iter()
            .all(|f| f.as_str() == UNKNOWN)
    }
}

/// Why a lookup produced no usable location
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider answered with HTTP {0}")]
    Status(u16),

    #[error("provider rejected lookup: {0}")]
    Rejected(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("geolocation disabled")]
    Disabled,
}

/// External geolocation lookup
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Short identifier used in log lines
    fn name(&self) -> &str;

    /// Resolve an already normalized address. One attempt, no retries.
    async fn lookup(&self, address: &str) -> Result<GeoLocation, GeoError>;
}

/// Provider used when lookups are switched off in configuration
pub struct DisabledProvider;

#[async_trait]
impl GeoProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn lookup(&self, _address: &str) -> Result<GeoLocation, GeoError> {
        Err(GeoError::Disabled)
    }
}

/// Fail-soft wrapper around a `GeoProvider`
pub struct GeoEnrichment {
    provider: Box<dyn GeoProvider>,
}

impl GeoEnrichment {
    pub fn new(provider: Box<dyn GeoProvider>) -> Self {
        Self { provider }
    }

    /// Build the enrichment layer described by the `geo` config section
    pub fn from_config(config: &GeoConfig) -> Self {
        if !config.enabled {
            return Self::new(Box::new(DisabledProvider));
        }

        match IpApiProvider::new(&config.endpoint, config.timeout()) {
            Ok(provider) => Self::new(Box::new(provider)),
            Err(e) => {
                warn!(error = %e, "geo_provider_init_failed");
                Self::new(Box::new(DisabledProvider))
            }
        }
    }

    /// Resolve a raw address. Never fails: any provider error yields
    /// `GeoLocation::unknown()`.
    pub async fn resolve(&self, raw_address: &str) -> GeoLocation {
        let address = address::normalize(raw_address);

        match self.provider.lookup(&address).await {
            Ok(location) => {
                debug!(
                    address = %address,
                    provider = %self.provider.name(),
                    country = %location.country,
                    "geo_resolved"
                );
                location
            }
            Err(GeoError::Disabled) => GeoLocation::unknown(),
            Err(e) => {
                warn!(
                    address = %address,
                    provider = %self.provider.name(),
                    error = %e,
                    "geo_lookup_failed"
                );
                GeoLocation::unknown()
            }
        }
    }
}

/// Replace a missing or blank field with the sentinel
pub(crate) fn field_or_unknown(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN.to_string(),
    }
}
