//! Have I Been Pwned adapter
//!
//! Checks common email patterns on the seed domain for breached
//! credentials. The API enforces strict pacing; calls are spaced at least
//! 6.1 seconds apart regardless of caller behavior.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{http_client, FeedError, FeedResult, Pacer, DEFAULT_TIMEOUT};

const HIBP_API_BASE: &str = "https://haveibeenpwned.com/api/v3";

/// Hard minimum spacing between HIBP requests.
const HIBP_MIN_INTERVAL: Duration = Duration::from_millis(6100);

/// Common email prefixes checked against the seed domain.
pub const COMMON_EMAIL_PREFIXES: &[&str] = &[
    "admin",
    "administrator",
    "info",
    "contact",
    "support",
    "help",
    "sales",
    "billing",
    "accounts",
    "security",
    "hr",
    "jobs",
    "careers",
    "press",
    "media",
    "marketing",
    "webmaster",
    "postmaster",
    "hostmaster",
    "abuse",
    "noc",
    "ops",
    "it",
    "helpdesk",
    "service",
    "customerservice",
    "feedback",
    "enquiries",
    "inquiries",
    "hello",
    "office",
    "team",
];

/// Breach summary for one email address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailBreaches {
    pub email: String,
    pub breached: bool,
    pub breach_count: usize,
    #[serde(default)]
    pub breaches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HibpDomainResult {
    pub domain: String,
    pub emails_checked: usize,
    pub emails_breached: usize,
    pub total_breaches: usize,
    pub breached_emails: Vec<EmailBreaches>,
    pub clean_emails: Vec<String>,
}

pub struct HibpClient {
    api_key: Option<String>,
    http: reqwest::Client,
    pacer: Pacer,
}

impl HibpClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            http: http_client(DEFAULT_TIMEOUT)?,
            pacer: Pacer::new(HIBP_MIN_INTERVAL),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Check one email against the breach database.
    pub async fn check_email(&self, email: &str) -> FeedResult<EmailBreaches> {
        let api_key = self.api_key.as_deref().ok_or(FeedError::NotConfigured)?;
        let email = email.trim().to_lowercase();

        self.pacer.wait().await;
        debug!(email, "HIBP breach check");

        let response = self
            .http
            .get(format!("{HIBP_API_BASE}/breachedaccount/{email}"))
            .header("hibp-api-key", api_key)
            .query(&[("truncateResponse", "true")])
            .send()
            .await?;

        let breaches: Vec<String> = match response.status().as_u16() {
            200 => {
                let entries: Vec<Value> = response.json().await?;
                entries
                    .iter()
                    .filter_map(|b| b["Name"].as_str().map(str::to_string))
                    .collect()
            }
            // 404 means no breaches for this account.
            404 => Vec::new(),
            401 => return Err(FeedError::Http("invalid API key".into())),
            403 => return Err(FeedError::Http("access forbidden - check subscription".into())),
            429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        };

        Ok(EmailBreaches {
            breached: !breaches.is_empty(),
            breach_count: breaches.len(),
            breaches,
            email,
        })
    }

    /// Check common email patterns for a domain, capped at `max_checks`.
    pub async fn check_domain_emails(
        &self,
        domain: &str,
        max_checks: usize,
    ) -> FeedResult<HibpDomainResult> {
        if self.api_key.is_none() {
            return Err(FeedError::NotConfigured);
        }

        let domain = domain.trim().to_lowercase();
        info!(domain, max_checks, "HIBP checking email patterns");

        let mut result = HibpDomainResult {
            domain: domain.clone(),
            ..Default::default()
        };

        for prefix in COMMON_EMAIL_PREFIXES.iter().take(max_checks) {
            let email = format!("{prefix}@{domain}");
            let breaches = match self.check_email(&email).await {
                Ok(b) => b,
                Err(e) if e.stops_stage() => {
                    warn!(domain, "HIBP rate limit hit, stopping checks");
                    break;
                }
                Err(e) => {
                    debug!(email, error = %e, "HIBP check failed");
                    continue;
                }
            };

            result.emails_checked += 1;
            if breaches.breached {
                result.emails_breached += 1;
                result.total_breaches += breaches.breach_count;
                result.breached_emails.push(breaches);
            } else {
                result.clean_emails.push(breaches.email);
            }
        }

        info!(
            domain,
            breached = result.emails_breached,
            checked = result.emails_checked,
            "HIBP domain check complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        // Without a key the client must refuse before any HTTP happens.
        let client = HibpClient::new(None).unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.check_email("admin@acme.com").await,
            Err(FeedError::NotConfigured)
        ));
        assert!(matches!(
            client.check_domain_emails("acme.com", 20).await,
            Err(FeedError::NotConfigured)
        ));
    }
}
