//! Recorded Future enrichment adapter
//!
//! Batch IOC enrichment through the SOAR API: up to 1000 entities per call,
//! returning risk scores, risk bands, and triggered evidence rules. Also
//! used during generation to discover brand-impersonation domains.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use watchtower_core::model::RfRiskLevel;

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const RF_API_BASE: &str = "https://api.recordedfuture.com";

/// SOAR enrichment batch limit.
pub const RF_BATCH_SIZE: usize = 1000;

/// Back-off applied once before giving up on a 429.
const RF_BACKOFF: Duration = Duration::from_secs(5);

/// Enrichment result for one entity (domain or IP).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RfEnrichment {
    pub risk_score: u8,
    pub risk_level: RfRiskLevel,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub evidence_count: usize,
}

/// A brand-impersonation domain surfaced by Recorded Future.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RfImpersonationDomain {
    pub domain: String,
    pub rf_risk_score: u8,
    pub rf_risk_level: RfRiskLevel,
    #[serde(default)]
    pub rf_rules: Vec<String>,
}

pub struct RecordedFutureClient {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl RecordedFutureClient {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| RF_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            http: http_client(DEFAULT_TIMEOUT)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> FeedResult<Value> {
        let api_key = self.api_key.as_deref().ok_or(FeedError::NotConfigured)?;
        let url = format!("{}/{endpoint}", self.base_url);

        let mut attempt = 0;
        loop {
            debug!(endpoint, "RecordedFuture POST");
            let response = self
                .http
                .post(&url)
                .header("X-RFToken", api_key)
                .json(payload)
                .send()
                .await?;

            match response.status().as_u16() {
                200 => return Ok(response.json().await?),
                401 => return Err(FeedError::Http("invalid API token".into())),
                403 => {
                    return Err(FeedError::Http(
                        "access forbidden - check API subscription".into(),
                    ))
                }
                429 if attempt == 0 => {
                    warn!(endpoint, "RecordedFuture 429, backing off");
                    tokio::time::sleep(RF_BACKOFF).await;
                    attempt += 1;
                }
                429 => return Err(FeedError::RateLimited),
                status => return Err(FeedError::Status(status)),
            }
        }
    }

    /// Enrich domains in batches; returns a domain -> enrichment map.
    pub async fn enrich_domains(
        &self,
        domains: &[String],
    ) -> FeedResult<HashMap<String, RfEnrichment>> {
        self.enrich_entities("domain", domains).await
    }

    /// Enrich IP addresses; input is deduplicated by the caller.
    pub async fn enrich_ips(&self, ips: &[String]) -> FeedResult<HashMap<String, RfEnrichment>> {
        self.enrich_entities("ip", ips).await
    }

    async fn enrich_entities(
        &self,
        kind: &str,
        values: &[String],
    ) -> FeedResult<HashMap<String, RfEnrichment>> {
        if values.is_empty() {
            return Ok(HashMap::new());
        }

        let mut enriched = HashMap::new();
        for batch in values.chunks(RF_BATCH_SIZE) {
            let normalized: Vec<String> =
                batch.iter().map(|v| v.trim().to_lowercase()).collect();
            info!(kind, count = normalized.len(), "RecordedFuture enrichment batch");

            let body = self
                .post("soar/v3/enrichment", &json!({ kind: normalized }))
                .await?;
            for (value, enrichment) in extract_enrichment(&body) {
                enriched.insert(value, enrichment);
            }
        }

        let high_risk = enriched.values().filter(|e| e.risk_score >= 65).count();
        info!(
            enriched = enriched.len(),
            high_risk, "RecordedFuture enrichment complete"
        );
        Ok(enriched)
    }

    /// Search for brand-impersonation domains by brand label, excluding the
    /// organization's own legitimate domains.
    pub async fn search_brand_domains(
        &self,
        brand: &str,
        legitimate_domains: &[String],
        limit: usize,
    ) -> FeedResult<Vec<RfImpersonationDomain>> {
        let payload = json!({
            "name": brand,
            "limit": limit,
        });
        let body = self.post("identity/domain/search", &payload).await?;

        let legit: Vec<String> = legitimate_domains
            .iter()
            .map(|d| d.to_lowercase())
            .collect();

        let mut domains = Vec::new();
        for entry in body["data"].as_array().into_iter().flatten() {
            let Some(domain) = entry["domain"].as_str().map(str::to_lowercase) else {
                continue;
            };
            if legit
                .iter()
                .any(|l| domain == *l || domain.ends_with(&format!(".{l}")))
            {
                continue;
            }
            let score = entry["risk"]["score"].as_u64().unwrap_or(0) as u8;
            domains.push(RfImpersonationDomain {
                domain,
                rf_risk_score: score,
                rf_risk_level: RfRiskLevel::from_score(score),
                rf_rules: rule_names(&entry["risk"]),
            });
        }

        info!(brand, count = domains.len(), "RF brand impersonation search");
        Ok(domains)
    }
}

/// Pull per-entity results out of a SOAR enrichment response.
fn extract_enrichment(body: &Value) -> Vec<(String, RfEnrichment)> {
    let mut results = Vec::new();
    for section in ["domain", "ip", "hash", "url", "vulnerability"] {
        for entry in body["data"]["results"][section]
            .as_array()
            .or_else(|| body["data"][section].as_array())
            .into_iter()
            .flatten()
        {
            let Some(value) = entry["entity"]["name"].as_str() else {
                continue;
            };
            let risk = &entry["risk"];
            let score = risk["score"].as_u64().unwrap_or(0) as u8;
            let rules = rule_names(risk);
            results.push((
                value.to_lowercase(),
                RfEnrichment {
                    risk_score: score,
                    risk_level: RfRiskLevel::from_score(score),
                    evidence_count: rules.len(),
                    rules,
                },
            ));
        }
    }
    results
}

fn rule_names(risk: &Value) -> Vec<String> {
    risk["evidenceDetails"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| e["rule"].as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_enrichment_from_soar_response() {
        let body = json!({
            "data": {
                "results": {
                    "domain": [
                        {
                            "entity": {"name": "Acme-Loan.com"},
                            "risk": {
                                "score": 72,
                                "evidenceDetails": [
                                    {"rule": "Recent Phishing Host"},
                                    {"rule": "Recently Registered"}
                                ]
                            }
                        }
                    ]
                }
            }
        });

        let results = extract_enrichment(&body);
        assert_eq!(results.len(), 1);
        let (value, enrichment) = &results[0];
        assert_eq!(value, "acme-loan.com");
        assert_eq!(enrichment.risk_score, 72);
        assert_eq!(enrichment.risk_level, RfRiskLevel::High);
        assert_eq!(enrichment.rules.len(), 2);
    }

    #[test]
    fn test_extract_enrichment_empty_body() {
        assert!(extract_enrichment(&json!({})).is_empty());
    }
}
