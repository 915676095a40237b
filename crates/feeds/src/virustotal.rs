//! VirusTotal domain reputation adapter
//!
//! One lookup per domain against the v3 API, paced for the free tier
//! (4 requests per minute). A 429 maps to `FeedError::RateLimited` so the
//! enrichment stage stops early and records the reason.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use watchtower_core::model::VtReputation;

use crate::{http_client, FeedError, FeedResult, Pacer, DEFAULT_TIMEOUT};

const VT_API_BASE: &str = "https://www.virustotal.com/api/v3";

/// Free-tier pacing: 4 requests per minute.
const VT_MIN_INTERVAL: Duration = Duration::from_secs(15);

pub struct VirusTotalClient {
    api_key: Option<String>,
    http: reqwest::Client,
    pacer: Pacer,
}

impl VirusTotalClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            http: http_client(DEFAULT_TIMEOUT)?,
            pacer: Pacer::new(VT_MIN_INTERVAL),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Look up reputation for a single domain.
    pub async fn lookup_domain(&self, domain: &str) -> FeedResult<VtReputation> {
        let api_key = self.api_key.as_deref().ok_or(FeedError::NotConfigured)?;
        let domain = domain.trim().to_lowercase();

        self.pacer.wait().await;
        debug!(domain, "VT domain lookup");

        let response = self
            .http
            .get(format!("{VT_API_BASE}/domains/{domain}"))
            .header("x-apikey", api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(FeedError::Http("invalid API key".into())),
            429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        let attrs = &body["data"]["attributes"];
        let stats = &attrs["last_analysis_stats"];

        let count = |key: &str| stats[key].as_u64().unwrap_or(0) as u32;
        let mut reputation = VtReputation::new(
            count("malicious"),
            count("suspicious"),
            count("harmless"),
            count("undetected"),
        );
        reputation.registrar = attrs["registrar"].as_str().map(str::to_string);
        reputation.vt_link = Some(format!("https://www.virustotal.com/gui/domain/{domain}"));

        info!(
            domain,
            threat_level = ?reputation.threat_level,
            malicious = reputation.malicious,
            suspicious = reputation.suspicious,
            "VT lookup complete"
        );

        Ok(reputation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        let client = VirusTotalClient::new(None).unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.lookup_domain("acmee.com").await,
            Err(FeedError::NotConfigured)
        ));
    }
}
