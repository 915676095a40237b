//! Certificate Transparency adapter (crt.sh)
//!
//! New certificates on lookalike domains are a strong attacker-preparation
//! signal. Three query shapes: per-lookalike cert search, watchlist checks
//! over a longer window, and a bulk brand search that can discover
//! impersonation domains the fuzzers cannot generate.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const CRT_SH_URL: &str = "https://crt.sh";

/// One certificate from the CT logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// Newline-separated SANs as crt.sh reports them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_timestamp: Option<String>,
}

/// Certificates found for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CtSearchResult {
    pub domain: String,
    pub total_count: usize,
    pub recent_count: usize,
    pub certificates: Vec<Certificate>,
}

/// A lookalike that acquired certificates recently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CtHighRiskDomain {
    pub domain: String,
    pub cert_count: usize,
    pub certificates: Vec<Certificate>,
    pub crt_sh_link: String,
}

/// Bulk result across the lookalike set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CtLookalikeResult {
    pub domains_checked: usize,
    pub domains_with_certs: usize,
    pub total_new_certs: usize,
    pub high_risk_domains: Vec<CtHighRiskDomain>,
}

/// A brand-impersonation domain discovered in the CT logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpersonationDomain {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_timestamp: Option<String>,
    pub crt_sh_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrandImpersonationResult {
    pub brand: String,
    pub new_domains: Vec<ImpersonationDomain>,
}

pub struct CtClient {
    http: reqwest::Client,
}

impl CtClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// crt.sh is free; no credentials needed.
    pub fn is_configured(&self) -> bool {
        true
    }

    async fn query(&self, pattern: &str) -> FeedResult<Vec<Value>> {
        let response = self
            .http
            .get(format!("{CRT_SH_URL}/"))
            .query(&[("q", pattern), ("output", "json")])
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            404 => return Ok(Vec::new()),
            status => return Err(FeedError::Status(status)),
        }

        let text = response.text().await?;
        if text.trim().is_empty() || text.trim() == "[]" {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| FeedError::Parse(e.to_string()))
    }

    /// Search certificates for a domain and its subdomains.
    pub async fn search_certificates(
        &self,
        domain: &str,
        days_back: i64,
    ) -> FeedResult<CtSearchResult> {
        debug!(domain, days_back, "CT log search");
        let entries = self.query(&format!("%.{domain}")).await?;
        let cutoff = Utc::now() - Duration::days(days_back);

        let mut seen_ids = std::collections::HashSet::new();
        let mut recent = Vec::new();
        for entry in &entries {
            // Keep unparseable timestamps to be safe.
            let is_recent = parse_ct_timestamp(entry["entry_timestamp"].as_str())
                .map(|t| t >= cutoff)
                .unwrap_or(true);
            if !is_recent {
                continue;
            }
            let id = entry["id"].as_u64();
            if let Some(id) = id {
                if !seen_ids.insert(id) {
                    continue;
                }
            }
            recent.push(parse_certificate(entry));
        }

        info!(domain, recent = recent.len(), "CT search complete");
        Ok(CtSearchResult {
            domain: domain.to_string(),
            total_count: entries.len(),
            recent_count: recent.len(),
            certificates: recent,
        })
    }

    /// Check lookalikes for recently issued certificates. Per-domain errors
    /// are treated as empty results so one flaky query never fails the scan.
    pub async fn check_lookalike_certs(
        &self,
        domains: &[String],
        days_back: i64,
    ) -> FeedResult<CtLookalikeResult> {
        let mut result = CtLookalikeResult {
            domains_checked: domains.len(),
            ..Default::default()
        };

        for domain in domains {
            let search = match self.search_certificates(domain, days_back).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(domain, error = %e, "CT search failed, treating as empty");
                    continue;
                }
            };
            if search.recent_count > 0 {
                result.domains_with_certs += 1;
                result.total_new_certs += search.recent_count;
                result.high_risk_domains.push(CtHighRiskDomain {
                    domain: domain.clone(),
                    cert_count: search.recent_count,
                    certificates: search.certificates.into_iter().take(5).collect(),
                    crt_sh_link: format!("{CRT_SH_URL}/?q={domain}"),
                });
            }
        }

        info!(
            with_certs = result.domains_with_certs,
            checked = result.domains_checked,
            "CT lookalike scan complete"
        );
        Ok(result)
    }

    /// Bulk search for any certificate whose name contains the brand label,
    /// excluding the organization's legitimate domains. Catches semantic
    /// attacks like `acme-secure-login.net` that fuzzers never emit.
    pub async fn discover_brand_impersonation(
        &self,
        brand: &str,
        legitimate_domains: &[String],
        hours_back: i64,
    ) -> FeedResult<BrandImpersonationResult> {
        info!(brand, hours_back, "CT brand impersonation search");
        let entries = self.query(&format!("%{brand}%")).await?;
        let cutoff = Utc::now() - Duration::hours(hours_back);
        let legit: Vec<String> = legitimate_domains
            .iter()
            .map(|d| d.to_lowercase())
            .collect();

        let mut seen = std::collections::HashSet::new();
        let mut new_domains = Vec::new();
        for entry in &entries {
            let is_recent = parse_ct_timestamp(entry["entry_timestamp"].as_str())
                .map(|t| t >= cutoff)
                .unwrap_or(false);
            if !is_recent {
                continue;
            }

            for name in entry["name_value"].as_str().unwrap_or("").lines() {
                let domain = name.trim().trim_start_matches("*.").to_lowercase();
                if domain.is_empty() || !domain.contains(brand) || !domain.contains('.') {
                    continue;
                }
                if legit
                    .iter()
                    .any(|l| domain == *l || domain.ends_with(&format!(".{l}")))
                {
                    continue;
                }
                if !seen.insert(domain.clone()) {
                    continue;
                }
                new_domains.push(ImpersonationDomain {
                    crt_sh_link: format!("{CRT_SH_URL}/?q={domain}"),
                    issuer: entry["issuer_name"].as_str().map(str::to_string),
                    entry_timestamp: entry["entry_timestamp"].as_str().map(str::to_string),
                    domain,
                });
            }
        }

        if !new_domains.is_empty() {
            warn!(
                brand,
                count = new_domains.len(),
                "new brand impersonation domains with certificates"
            );
        }
        Ok(BrandImpersonationResult {
            brand: brand.to_string(),
            new_domains,
        })
    }
}

fn parse_certificate(entry: &Value) -> Certificate {
    Certificate {
        id: entry["id"].as_u64(),
        issuer_name: entry["issuer_name"].as_str().map(str::to_string),
        common_name: entry["common_name"].as_str().map(str::to_string),
        name_value: entry["name_value"].as_str().map(str::to_string),
        not_before: entry["not_before"].as_str().map(str::to_string),
        not_after: entry["not_after"].as_str().map(str::to_string),
        entry_timestamp: entry["entry_timestamp"].as_str().map(str::to_string),
    }
}

/// crt.sh timestamps come as `2024-01-15T09:30:00.123` (no zone).
fn parse_ct_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    let trimmed = value.split('.').next().unwrap_or(value);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ct_timestamp_formats() {
        assert!(parse_ct_timestamp(Some("2024-01-15T09:30:00")).is_some());
        assert!(parse_ct_timestamp(Some("2024-01-15T09:30:00.123")).is_some());
        assert!(parse_ct_timestamp(Some("2024-01-15 09:30:00")).is_some());
        assert!(parse_ct_timestamp(Some("not-a-date")).is_none());
        assert!(parse_ct_timestamp(None).is_none());
    }

    #[test]
    fn test_parse_certificate_fields() {
        let entry = serde_json::json!({
            "id": 1234,
            "issuer_name": "C=US, O=Let's Encrypt, CN=R3",
            "common_name": "acme-secure-login.net",
            "name_value": "acme-secure-login.net\nwww.acme-secure-login.net",
            "entry_timestamp": "2024-01-15T09:30:00"
        });
        let cert = parse_certificate(&entry);
        assert_eq!(cert.id, Some(1234));
        assert_eq!(cert.common_name.as_deref(), Some("acme-secure-login.net"));
    }
}
