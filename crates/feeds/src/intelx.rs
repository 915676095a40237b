//! IntelligenceX adapter: dark web, leaks, and paste-site search
//!
//! The API is asynchronous: a search is started, polled for records until
//! the status reports completion, and terminated on exit to free server
//! resources. Polling is bounded by a hard deadline.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{http_client, FeedError, FeedResult};

const INTELX_API_BASE: &str = "https://2.intelx.io";

/// IntelX polling can be slow; requests get a longer timeout than the
/// default feed budget.
const INTELX_TIMEOUT: Duration = Duration::from_secs(60);

/// Total polling budget per search.
const POLL_DEADLINE: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Search result statuses: 1 = complete, 2 = no results, 3 = invalid id.
const TERMINAL_STATUSES: &[u64] = &[1, 2, 3];

/// One record from an IntelX search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntelxRecord {
    pub system_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub media_type: String,
    pub bucket: String,
    pub is_darkweb: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelx_url: Option<String>,
}

/// A phonebook selector (email, subdomain, or URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhonebookEntry {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

/// Categorized findings for one seed domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IntelxFindings {
    pub domain: String,
    pub total_findings: usize,
    pub darkweb_findings: Vec<IntelxRecord>,
    pub leak_findings: Vec<IntelxRecord>,
    pub paste_findings: Vec<IntelxRecord>,
    pub other_findings: Vec<IntelxRecord>,
    pub phonebook_emails: Vec<PhonebookEntry>,
    pub phonebook_subdomains: Vec<PhonebookEntry>,
}

pub struct IntelxClient {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl IntelxClient {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| INTELX_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            http: http_client(INTELX_TIMEOUT)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> FeedResult<&str> {
        self.api_key.as_deref().ok_or(FeedError::NotConfigured)
    }

    /// Search all IntelX buckets for a term, polling until complete.
    pub async fn search(&self, term: &str, max_results: usize) -> FeedResult<Vec<IntelxRecord>> {
        let api_key = self.key()?;

        let response = self
            .http
            .post(format!("{}/intelligent/search", self.base_url))
            .header("x-key", api_key)
            .json(&json!({
                "term": term,
                "maxresults": max_results,
                "media": 0,
                "sort": 2,
                "terminate": [],
            }))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            402 => return Err(FeedError::CreditsExhausted),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        let Some(search_id) = body["id"].as_str().map(str::to_string) else {
            return Err(FeedError::Parse("no search id returned".into()));
        };

        let records = self.poll_results(&search_id).await;
        self.terminate(&search_id).await;
        records
    }

    async fn poll_results(&self, search_id: &str) -> FeedResult<Vec<IntelxRecord>> {
        let api_key = self.key()?;
        let url = format!("{}/intelligent/search/result", self.base_url);
        let deadline = Instant::now() + POLL_DEADLINE;
        let mut records = Vec::new();

        while Instant::now() < deadline {
            let response = self
                .http
                .get(&url)
                .header("x-key", api_key)
                .query(&[("id", search_id)])
                .send()
                .await?;
            if !response.status().is_success() {
                warn!(search_id, status = %response.status(), "IntelX result poll failed");
                break;
            }

            let body: Value = response.json().await?;
            for record in body["records"].as_array().into_iter().flatten() {
                if let Some(parsed) = parse_record(record) {
                    records.push(parsed);
                }
            }

            let status = body["status"].as_u64().unwrap_or(0);
            if TERMINAL_STATUSES.contains(&status) {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Ok(records)
    }

    /// Terminate a search to free server resources; failures only logged.
    async fn terminate(&self, search_id: &str) {
        let Ok(api_key) = self.key() else { return };
        let url = format!("{}/intelligent/search/terminate", self.base_url);
        if let Err(e) = self
            .http
            .get(&url)
            .header("x-key", api_key)
            .query(&[("id", search_id)])
            .send()
            .await
        {
            debug!(search_id, error = %e, "failed to terminate IntelX search");
        }
    }

    /// Phonebook search: target 1 = emails, 2 = domains/subdomains.
    pub async fn phonebook(&self, term: &str, target: u8) -> FeedResult<Vec<PhonebookEntry>> {
        let api_key = self.key()?;

        let response = self
            .http
            .post(format!("{}/phonebook/search", self.base_url))
            .header("x-key", api_key)
            .json(&json!({
                "term": term,
                "maxresults": 1000,
                "media": 0,
                "target": target,
                "terminate": [],
            }))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            // Phonebook is unavailable on some tiers.
            401 => return Err(FeedError::Http("phonebook requires paid API key".into())),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        let Some(search_id) = body["id"].as_str().map(str::to_string) else {
            return Err(FeedError::Parse("no search id returned".into()));
        };

        let url = format!("{}/phonebook/search/result", self.base_url);
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut entries = Vec::new();

        while Instant::now() < deadline {
            let response = self
                .http
                .get(&url)
                .header("x-key", api_key)
                .query(&[("id", search_id.as_str())])
                .send()
                .await?;
            if !response.status().is_success() {
                break;
            }

            let body: Value = response.json().await?;
            for selector in body["selectors"].as_array().into_iter().flatten() {
                if let Some(value) = selector["selectorvalue"].as_str() {
                    entries.push(PhonebookEntry {
                        value: value.to_string(),
                        first_seen: selector["firstseen"].as_str().map(str::to_string),
                        last_seen: selector["lastseen"].as_str().map(str::to_string),
                    });
                }
            }

            let status = body["status"].as_u64().unwrap_or(0);
            if TERMINAL_STATUSES.contains(&status) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Ok(entries)
    }

    /// Full domain sweep: one general search categorized by bucket, plus
    /// phonebook emails and subdomains where the tier allows.
    pub async fn search_domain(&self, domain: &str) -> FeedResult<IntelxFindings> {
        info!(domain, "IntelX domain search");
        let mut findings = IntelxFindings {
            domain: domain.to_string(),
            ..Default::default()
        };

        for record in self.search(domain, 100).await? {
            let bucket = record.bucket.to_lowercase();
            if record.is_darkweb || bucket.starts_with("darknet") {
                findings.darkweb_findings.push(record);
            } else if bucket.contains("leak") {
                findings.leak_findings.push(record);
            } else if bucket.contains("paste") || bucket.starts_with("dumpster") {
                findings.paste_findings.push(record);
            } else {
                findings.other_findings.push(record);
            }
        }

        match self.phonebook(domain, 1).await {
            Ok(emails) => findings.phonebook_emails = emails,
            Err(e) => debug!(domain, error = %e, "phonebook email search unavailable"),
        }
        match self.phonebook(domain, 2).await {
            Ok(subdomains) => findings.phonebook_subdomains = subdomains,
            Err(e) => debug!(domain, error = %e, "phonebook subdomain search unavailable"),
        }

        findings.total_findings = findings.darkweb_findings.len()
            + findings.leak_findings.len()
            + findings.paste_findings.len()
            + findings.other_findings.len();

        info!(
            domain,
            total = findings.total_findings,
            darkweb = findings.darkweb_findings.len(),
            leaks = findings.leak_findings.len(),
            "IntelX search complete"
        );
        Ok(findings)
    }
}

/// Media type ids documented in the IntelX SDK.
fn media_type_name(media: u64) -> &'static str {
    match media {
        1 => "paste_document",
        2 => "paste_user",
        3 => "forum",
        4 => "forum_board",
        5 => "url",
        13 => "dumpster",
        14 => "whois",
        18 => "darknet_tor",
        19 => "darknet_i2p",
        24 => "leak_public",
        25 => "leak_private",
        _ => "unknown",
    }
}

fn parse_record(record: &Value) -> Option<IntelxRecord> {
    let system_id = record["systemid"].as_str()?.to_string();
    let media = record["media"].as_u64().unwrap_or(0);
    let bucket = record["bucket"].as_str().unwrap_or("").to_string();
    let is_darkweb = media == 18 || media == 19 || bucket.starts_with("darknet");

    Some(IntelxRecord {
        intelx_url: (!system_id.is_empty())
            .then(|| format!("https://intelx.io/?did={system_id}")),
        name: record["name"].as_str().unwrap_or("").to_string(),
        date: record["date"].as_str().map(str::to_string),
        media_type: media_type_name(media).to_string(),
        bucket,
        is_darkweb,
        system_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_darkweb_detection() {
        let record = json!({
            "systemid": "abc-123",
            "name": "credentials dump",
            "media": 18,
            "bucket": "darknet.tor",
            "date": "2024-01-15"
        });
        let parsed = parse_record(&record).unwrap();
        assert!(parsed.is_darkweb);
        assert_eq!(parsed.media_type, "darknet_tor");
        assert_eq!(parsed.intelx_url.as_deref(), Some("https://intelx.io/?did=abc-123"));
    }

    #[test]
    fn test_parse_record_requires_system_id() {
        assert!(parse_record(&json!({"name": "x"})).is_none());
    }
}
