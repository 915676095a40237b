//! Clear-web leak and brand-mention monitor
//!
//! Sweeps public sources for leaked data and brand abuse: URLScan scan
//! history, GitHub code search, psbdmp paste archives, and LeakIX. Each
//! source fails independently; the sweep succeeds with whatever answered.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use watchtower_core::model::FeedReport;

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

/// One finding from any leak source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeakHit {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub high_risk: bool,
}

/// Findings from a single source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LeakSource {
    pub count: usize,
    pub results: Vec<LeakHit>,
}

/// Aggregated sweep across all sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LeakFindings {
    pub domain: String,
    pub total_findings: usize,
    pub high_risk_findings: Vec<LeakHit>,
    pub sources: BTreeMap<String, FeedReport<LeakSource>>,
}

pub struct LeakMonitor {
    http: reqwest::Client,
    github_token: Option<String>,
}

impl LeakMonitor {
    pub fn new(github_token: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(DEFAULT_TIMEOUT)?,
            github_token,
        })
    }

    /// The sweep itself needs no credentials; GitHub search is skipped
    /// without a token (unauthenticated limits are too tight to be useful).
    pub fn is_configured(&self) -> bool {
        true
    }

    /// Search URLScan for scans of pages impersonating the brand.
    async fn search_urlscan(&self, domain: &str) -> FeedResult<LeakSource> {
        let brand = domain.split('.').next().unwrap_or(domain);
        let response = self
            .http
            .get("https://urlscan.io/api/v1/search/")
            .query(&[
                (
                    "q",
                    format!("page.domain:\"{domain}\" OR page.domain:*{brand}*"),
                ),
                ("size", "100".to_string()),
            ])
            .send()
            .await?;
        match response.status().as_u16() {
            200 => {}
            429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        let results: Vec<LeakHit> = body["results"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|item| item["page"]["domain"].as_str() != Some(domain))
            .map(|item| LeakHit {
                source: "urlscan.io".into(),
                url: item["page"]["url"].as_str().map(str::to_string),
                title: item["page"]["domain"].as_str().map(str::to_string),
                date: item["task"]["time"].as_str().map(str::to_string),
                high_risk: item["verdicts"]["overall"]["malicious"]
                    .as_bool()
                    .unwrap_or(false),
            })
            .collect();

        Ok(LeakSource {
            count: results.len(),
            results,
        })
    }

    /// Search GitHub code for the domain next to credential keywords.
    async fn search_github(&self, domain: &str) -> FeedResult<LeakSource> {
        let token = self.github_token.as_deref().ok_or(FeedError::NotConfigured)?;

        let response = self
            .http
            .get("https://api.github.com/search/code")
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("q", format!("\"{domain}\" password OR secret OR api_key")),
                ("per_page", "30".to_string()),
            ])
            .send()
            .await?;
        match response.status().as_u16() {
            200 => {}
            403 | 429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        let results: Vec<LeakHit> = body["items"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| LeakHit {
                source: "github".into(),
                url: item["html_url"].as_str().map(str::to_string),
                title: item["repository"]["full_name"].as_str().map(str::to_string),
                date: None,
                high_risk: false,
            })
            .collect();

        Ok(LeakSource {
            count: results.len(),
            results,
        })
    }

    /// Search psbdmp.ws for pastes mentioning the domain.
    async fn search_pastes(&self, domain: &str) -> FeedResult<LeakSource> {
        let response = self
            .http
            .get(format!("https://psbdmp.ws/api/v3/search/{domain}"))
            .send()
            .await?;
        if !response.status().is_success() {
            // The paste archive is frequently down; treat as empty.
            debug!(domain, status = %response.status(), "psbdmp unavailable");
            return Ok(LeakSource::default());
        }

        let body: Value = response.json().await?;
        let results: Vec<LeakHit> = body["data"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| LeakHit {
                source: "psbdmp".into(),
                url: item["id"]
                    .as_str()
                    .map(|id| format!("https://pastebin.com/{id}")),
                title: None,
                date: item["time"].as_str().map(str::to_string),
                high_risk: false,
            })
            .collect();

        Ok(LeakSource {
            count: results.len(),
            results,
        })
    }

    /// Search LeakIX for exposed services and leaks tied to the domain.
    async fn search_leakix(&self, domain: &str) -> FeedResult<LeakSource> {
        let response = self
            .http
            .get("https://leakix.net/search")
            .header("Accept", "application/json")
            .query(&[("q", format!("host:\"{domain}\"")), ("scope", "leak".to_string())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(LeakSource::default());
        }

        let body: Value = response.json().await?;
        let results: Vec<LeakHit> = body
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| LeakHit {
                source: "leakix".into(),
                url: item["host"].as_str().map(|h| format!("https://leakix.net/host/{h}")),
                title: item["event_type"].as_str().map(str::to_string),
                date: item["time"].as_str().map(str::to_string),
                high_risk: true,
            })
            .collect();

        Ok(LeakSource {
            count: results.len(),
            results,
        })
    }

    /// Sweep all sources for one seed domain.
    pub async fn search_all(&self, domain: &str) -> LeakFindings {
        info!(domain, "clear-web leak sweep");
        let mut findings = LeakFindings {
            domain: domain.to_string(),
            ..Default::default()
        };

        let sources: [(&str, FeedResult<LeakSource>); 4] = [
            ("urlscan", self.search_urlscan(domain).await),
            ("github", self.search_github(domain).await),
            ("pastes", self.search_pastes(domain).await),
            ("leakix", self.search_leakix(domain).await),
        ];

        for (name, outcome) in sources {
            match outcome {
                Ok(source) => {
                    findings.total_findings += source.count;
                    findings
                        .high_risk_findings
                        .extend(source.results.iter().filter(|h| h.high_risk).cloned());
                    findings
                        .sources
                        .insert(name.to_string(), FeedReport::ok(source));
                }
                Err(FeedError::NotConfigured) => {
                    findings
                        .sources
                        .insert(name.to_string(), FeedReport::not_configured());
                }
                Err(e) => {
                    debug!(domain, source = name, error = %e, "leak source failed");
                    findings
                        .sources
                        .insert(name.to_string(), FeedReport::err(e.to_string()));
                }
            }
        }

        info!(
            domain,
            total = findings.total_findings,
            high_risk = findings.high_risk_findings.len(),
            "leak sweep complete"
        );
        findings
    }
}
