//! AbuseIPDB adapter
//!
//! Community-driven IP reputation. Lookalike domains are checked through
//! their already-resolved A records, capped at 5 IPs per domain; a process
//! counter guards the 1000-checks-per-day free-tier budget.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const ABUSEIPDB_API: &str = "https://api.abuseipdb.com/api/v2";

/// Free-tier daily check budget.
const DAILY_CHECK_BUDGET: u32 = 1000;

/// IPs checked per domain; a cost control, not a correctness requirement.
pub const MAX_IPS_PER_DOMAIN: usize = 5;

/// Abuse confidence score at or above which an IP counts as malicious.
const MALICIOUS_SCORE_THRESHOLD: u32 = 25;

/// Reputation for one IP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpReputation {
    pub ip: String,
    pub abuse_confidence_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<String>,
    pub total_reports: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reported_at: Option<String>,
    pub link: String,
}

/// Reputation rollup for one domain's resolved IPs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DomainIpReputation {
    pub domain: String,
    pub ips_checked: usize,
    pub max_abuse_score: u32,
    pub malicious_ips: Vec<IpReputation>,
    pub clean_ips: Vec<String>,
    /// Set when the check stopped early on a rate limit or exhausted budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_early: Option<String>,
}

/// Bulk result across the active lookalike set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AbuseIpDbBulkResult {
    pub domains_checked: usize,
    pub domains_with_malicious_ips: Vec<DomainIpReputation>,
    pub clean_domains: Vec<String>,
    /// Set when the stage stopped early on a rate limit or exhausted budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_early: Option<String>,
}

pub struct AbuseIpDbClient {
    api_key: Option<String>,
    http: reqwest::Client,
    checks_today: AtomicU32,
}

impl AbuseIpDbClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            http: http_client(DEFAULT_TIMEOUT)?,
            checks_today: AtomicU32::new(0),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Check a single IP, consuming one unit of the daily budget.
    pub async fn check_ip(&self, ip: &str) -> FeedResult<IpReputation> {
        let api_key = self.api_key.as_deref().ok_or(FeedError::NotConfigured)?;
        if self.checks_today.fetch_add(1, Ordering::Relaxed) >= DAILY_CHECK_BUDGET {
            return Err(FeedError::CreditsExhausted);
        }

        let ip = ip.trim();
        debug!(ip, "AbuseIPDB check");

        let response = self
            .http
            .get(format!("{ABUSEIPDB_API}/check"))
            .header("Key", api_key)
            .header("Accept", "application/json")
            .query(&[
                ("ipAddress", ip),
                ("maxAgeInDays", "90"),
                ("verbose", "true"),
            ])
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(FeedError::Http("invalid API key".into())),
            429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        }

        let data = response.json::<Value>().await?;
        let data = &data["data"];
        Ok(IpReputation {
            ip: ip.to_string(),
            abuse_confidence_score: data["abuseConfidenceScore"].as_u64().unwrap_or(0) as u32,
            country_code: data["countryCode"].as_str().map(str::to_string),
            isp: data["isp"].as_str().map(str::to_string),
            usage_type: data["usageType"].as_str().map(str::to_string),
            total_reports: data["totalReports"].as_u64().unwrap_or(0) as u32,
            last_reported_at: data["lastReportedAt"].as_str().map(str::to_string),
            link: format!("https://www.abuseipdb.com/check/{ip}"),
        })
    }

    /// Check a domain's resolved IPs (capped per domain).
    pub async fn check_domain_ips(
        &self,
        domain: &str,
        ips: &[String],
    ) -> FeedResult<DomainIpReputation> {
        if self.api_key.is_none() {
            return Err(FeedError::NotConfigured);
        }

        let mut result = DomainIpReputation {
            domain: domain.trim().to_lowercase(),
            ..Default::default()
        };

        for ip in ips.iter().take(MAX_IPS_PER_DOMAIN) {
            let reputation = match self.check_ip(ip).await {
                Ok(r) => r,
                Err(e) if e.stops_stage() => {
                    // Keep what was already classified; record the reason.
                    warn!(ip = %ip, error = %e, "AbuseIPDB stopping early");
                    result.stopped_early = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    debug!(ip = %ip, error = %e, "AbuseIPDB IP check failed");
                    continue;
                }
            };
            result.ips_checked += 1;
            result.max_abuse_score = result
                .max_abuse_score
                .max(reputation.abuse_confidence_score);

            if reputation.abuse_confidence_score >= MALICIOUS_SCORE_THRESHOLD {
                result.malicious_ips.push(reputation);
            } else {
                result.clean_ips.push(reputation.ip);
            }
        }

        Ok(result)
    }

    /// Check the active lookalike set through their resolved IPs.
    pub async fn bulk_check_domains(
        &self,
        domains: &[(String, Vec<String>)],
    ) -> FeedResult<AbuseIpDbBulkResult> {
        if self.api_key.is_none() {
            return Err(FeedError::NotConfigured);
        }

        let mut result = AbuseIpDbBulkResult::default();
        for (domain, ips) in domains {
            let reputation = self.check_domain_ips(domain, ips).await?;
            result.domains_checked += 1;
            let stopped = reputation.stopped_early.clone();
            if !reputation.malicious_ips.is_empty() {
                result.domains_with_malicious_ips.push(reputation);
            } else if stopped.is_none() {
                result.clean_domains.push(reputation.domain);
            }
            if let Some(reason) = stopped {
                result.stopped_early = Some(reason);
                break;
            }
        }

        info!(
            checked = result.domains_checked,
            malicious = result.domains_with_malicious_ips.len(),
            "AbuseIPDB bulk check complete"
        );
        Ok(result)
    }
}
