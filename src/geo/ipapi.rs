//! ip-api.com compatible HTTP provider
//!
//! `GET {endpoint}/{address}` answers with
//! `{"status": "success", "country": .., "regionName": .., "city": .., "isp": ..}`
//! or `{"status": "fail", "message": ..}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{field_or_unknown, GeoError, GeoLocation, GeoProvider};

pub struct IpApiProvider {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    isp: Option<String>,
}

impl IpApiProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GeoError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn lookup_url(&self, address: &str) -> String {
        format!("{}/{}", self.endpoint, address)
    }
}

/// Interpret a provider payload
fn parse_payload(body: &str) -> Result<GeoLocation, GeoError> {
    let parsed: LookupResponse =
        serde_json::from_str(body).map_err(|e| GeoError::Malformed(e.to_string()))?;

    match parsed.status.as_deref() {
        Some("success") => Ok(GeoLocation {
            country: field_or_unknown(parsed.country),
            city: field_or_unknown(parsed.city),
            region: field_or_unknown(parsed.region_name),
            isp: field_or_unknown(parsed.isp),
        }),
        Some(_) => Err(GeoError::Rejected(
            parsed.message.unwrap_or_else(|| "unspecified".to_string()),
        )),
        None => Err(GeoError::Malformed("missing status".to_string())),
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    fn name(&self) -> &str {
        "ip-api"
    }

    async fn lookup(&self, address: &str) -> Result<GeoLocation, GeoError> {
        let response = self.client.get(self.lookup_url(address)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_payload(&body)
    }
}
