//! URLScan.io adapter
//!
//! Two roles: searching existing public scans during leak monitoring, and
//! the middle tier of the parking cascade, which reads page categories from
//! existing scans. Parking verdicts are memoized for 24 hours. New-scan
//! submission is deliberately not implemented; existing public scans plus
//! the HTTP content probe cover the classification need.

use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use watchtower_core::model::Confidence;

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const URLSCAN_API_BASE: &str = "https://urlscan.io/api/v1";

const PARKING_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Page categories that indicate a parked domain.
const PARKING_CATEGORIES: &[&str] = &[
    "parked",
    "parking",
    "domain parking",
    "for sale",
    "placeholder",
    "coming soon",
    "under construction",
];

/// Known parking service domains appearing in scan request chains.
const PARKING_SERVICE_DOMAINS: &[&str] = &[
    "sedoparking.com",
    "bodis.com",
    "parkingcrew.net",
    "parkingcrew.com",
    "above.com",
    "hugedomains.com",
    "afternic.com",
    "dan.com",
    "sav.com",
    "undeveloped.com",
    "domainmarket.com",
    "domainnamesales.com",
    "registrar-servers.com",
];

/// Page title fragments that indicate parking.
const PARKING_TITLE_KEYWORDS: &[&str] = &[
    "domain for sale",
    "buy this domain",
    "parked",
    "coming soon",
    "under construction",
    "domain parking",
    "make an offer",
    "is for sale",
    "recently been registered",
];

/// One existing scan returned by the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlscanHit {
    pub scan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_time: Option<String>,
    pub malicious: bool,
    pub result_url: String,
}

/// Parking analysis extracted from one scan result.
#[derive(Debug, Clone, PartialEq)]
pub struct ParkingAnalysis {
    pub is_parked: bool,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

pub struct UrlscanClient {
    api_key: Option<String>,
    http: reqwest::Client,
    parking_cache: DashMap<String, (Option<bool>, Instant)>,
}

impl UrlscanClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            http: http_client(DEFAULT_TIMEOUT)?,
            parking_cache: DashMap::new(),
        })
    }

    /// The search endpoint is free; a key only gates scan submission.
    pub fn is_configured(&self) -> bool {
        true
    }

    /// Search existing scans for a domain.
    pub async fn search_domain(&self, domain: &str, size: usize) -> FeedResult<Vec<UrlscanHit>> {
        debug!(domain, "URLScan search");
        let mut request = self
            .http
            .get(format!("{URLSCAN_API_BASE}/search/"))
            .query(&[
                ("q", format!("page.domain:\"{domain}\"")),
                ("size", size.to_string()),
            ]);
        if let Some(key) = &self.api_key {
            request = request.header("API-Key", key);
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            200 => {}
            429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        Ok(body["results"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let scan_id = item["_id"].as_str()?.to_string();
                Some(UrlscanHit {
                    result_url: format!("https://urlscan.io/result/{scan_id}/"),
                    url: item["page"]["url"].as_str().map(str::to_string),
                    page_domain: item["page"]["domain"].as_str().map(str::to_string),
                    scan_time: item["task"]["time"].as_str().map(str::to_string),
                    malicious: item["verdicts"]["overall"]["malicious"]
                        .as_bool()
                        .unwrap_or(false),
                    scan_id,
                })
            })
            .collect())
    }

    /// Fetch the full result of a completed scan.
    pub async fn scan_result(&self, scan_id: &str) -> FeedResult<Value> {
        let response = self
            .http
            .get(format!("{URLSCAN_API_BASE}/result/{scan_id}/"))
            .send()
            .await?;
        match response.status().as_u16() {
            200 => Ok(response.json().await?),
            404 => Err(FeedError::Http("scan not found or not yet complete".into())),
            status => Err(FeedError::Status(status)),
        }
    }

    /// Parking verdict from existing scans: `Some(true)` parked,
    /// `Some(false)` confidently not parked, `None` undetermined.
    pub async fn check_parking_status(&self, domain: &str) -> Option<bool> {
        if let Some(entry) = self.parking_cache.get(domain) {
            let (verdict, cached_at) = *entry;
            if cached_at.elapsed() < PARKING_CACHE_TTL {
                debug!(domain, ?verdict, "URLScan parking cache hit");
                return verdict;
            }
        }

        let hits = match self.search_domain(domain, 5).await {
            Ok(hits) if !hits.is_empty() => hits,
            _ => return None,
        };

        for hit in hits {
            let Ok(scan) = self.scan_result(&hit.scan_id).await else {
                continue;
            };
            let analysis = extract_parking_indicators(&scan);
            if analysis.is_parked {
                info!(domain, reasons = ?analysis.reasons, "URLScan parking verdict");
                self.parking_cache
                    .insert(domain.to_string(), (Some(true), Instant::now()));
                return Some(true);
            }
            if analysis.confidence != Confidence::Low {
                self.parking_cache
                    .insert(domain.to_string(), (Some(false), Instant::now()));
                return Some(false);
            }
        }

        None
    }
}

/// Pull parking indicators out of a full scan result.
pub fn extract_parking_indicators(scan: &Value) -> ParkingAnalysis {
    let mut analysis = ParkingAnalysis {
        is_parked: false,
        confidence: Confidence::Low,
        reasons: Vec::new(),
    };

    // urlscan's own and community categorizations are authoritative.
    for verdict_key in ["urlscan", "community"] {
        for cat in scan["verdicts"][verdict_key]["categories"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| c.as_str())
        {
            let cat_lower = cat.to_lowercase();
            if PARKING_CATEGORIES.iter().any(|p| cat_lower.contains(p)) {
                analysis.is_parked = true;
                analysis.confidence = Confidence::High;
                analysis.reasons.push(format!("{verdict_key} category: {cat}"));
            }
        }
    }

    // Requests to known parking services in the page's domain list.
    for domain in scan["lists"]["domains"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|d| d.as_str())
    {
        let domain_lower = domain.to_lowercase();
        for parking in PARKING_SERVICE_DOMAINS {
            if domain_lower.contains(parking) {
                analysis.is_parked = true;
                if analysis.confidence == Confidence::Low {
                    analysis.confidence = Confidence::Medium;
                }
                analysis.reasons.push(format!("parking service: {parking}"));
            }
        }
    }

    if let Some(title) = scan["page"]["title"].as_str() {
        let title_lower = title.to_lowercase();
        for keyword in PARKING_TITLE_KEYWORDS {
            if title_lower.contains(keyword) {
                analysis.is_parked = true;
                if analysis.confidence == Confidence::Low {
                    analysis.confidence = Confidence::Medium;
                }
                analysis.reasons.push(format!("title contains: '{keyword}'"));
                break;
            }
        }
    }

    // A categorized page with real content is confidently not parked.
    if !analysis.is_parked
        && scan["verdicts"]["urlscan"]["categories"]
            .as_array()
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    {
        analysis.confidence = Confidence::Medium;
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parking_category_detected() {
        let scan = json!({
            "verdicts": {"urlscan": {"categories": ["Domain Parking"]}},
            "page": {"title": "whatever"}
        });
        let analysis = extract_parking_indicators(&scan);
        assert!(analysis.is_parked);
        assert_eq!(analysis.confidence, Confidence::High);
    }

    #[test]
    fn test_parking_service_in_request_chain() {
        let scan = json!({
            "lists": {"domains": ["cdn.example.com", "img.sedoparking.com"]},
            "page": {"title": "x"}
        });
        let analysis = extract_parking_indicators(&scan);
        assert!(analysis.is_parked);
        assert_eq!(analysis.confidence, Confidence::Medium);
    }

    #[test]
    fn test_parking_title_keyword() {
        let scan = json!({
            "page": {"title": "This domain is for sale - make an offer"}
        });
        let analysis = extract_parking_indicators(&scan);
        assert!(analysis.is_parked);
    }

    #[test]
    fn test_categorized_content_is_not_parked() {
        let scan = json!({
            "verdicts": {"urlscan": {"categories": ["ecommerce"]}},
            "page": {"title": "Acme store"}
        });
        let analysis = extract_parking_indicators(&scan);
        assert!(!analysis.is_parked);
        assert_eq!(analysis.confidence, Confidence::Medium);
    }

    #[test]
    fn test_empty_scan_is_undetermined() {
        let analysis = extract_parking_indicators(&json!({}));
        assert!(!analysis.is_parked);
        assert_eq!(analysis.confidence, Confidence::Low);
    }
}
