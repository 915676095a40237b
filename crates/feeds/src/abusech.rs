//! abuse.ch adapter: URLhaus, ThreatFox, and Feodo Tracker
//!
//! Free feeds, no API key required. The Feodo C2 IP blocklist is fetched
//! once and cached in-process for 24 hours.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const URLHAUS_API: &str = "https://urlhaus-api.abuse.ch/v1";
const THREATFOX_API: &str = "https://threatfox-api.abuse.ch/api/v1";
const FEODO_BLOCKLIST_URL: &str = "https://feodotracker.abuse.ch/downloads/ipblocklist.json";

const FEODO_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One malicious URL known to URLhaus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlhausUrl {
    pub url: Option<String>,
    pub url_status: Option<String>,
    pub threat: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UrlhausResult {
    pub found: bool,
    pub url_count: usize,
    #[serde(default)]
    pub urls: Vec<UrlhausUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urlhaus_link: Option<String>,
}

/// One IOC known to ThreatFox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatfoxIoc {
    pub ioc: Option<String>,
    pub ioc_type: Option<String>,
    pub threat_type: Option<String>,
    pub malware: Option<String>,
    pub confidence_level: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ThreatfoxResult {
    pub found: bool,
    pub ioc_count: usize,
    #[serde(default)]
    pub iocs: Vec<ThreatfoxIoc>,
}

/// Feodo Tracker C2 entry for an IP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeodoResult {
    pub is_c2: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Combined verdict for one domain across abuse.ch sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainAbuseSummary {
    pub domain: String,
    pub is_malicious: bool,
    pub threat_types: Vec<String>,
    pub urlhaus: UrlhausResult,
    pub threatfox: ThreatfoxResult,
}

/// Combined verdict for one IP across abuse.ch sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpAbuseSummary {
    pub ip: String,
    pub is_malicious: bool,
    pub is_c2: bool,
    pub threat_types: Vec<String>,
    pub threatfox: ThreatfoxResult,
    pub feodo: FeodoResult,
}

/// Bulk result across the active lookalike set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AbusechBulkResult {
    pub domains_checked: usize,
    pub malicious_domains: Vec<DomainAbuseSummary>,
    pub clean_domains: Vec<String>,
}

struct FeodoCache {
    loaded_at: Instant,
    ips: Arc<HashMap<String, FeodoResult>>,
}

pub struct AbuseChClient {
    http: reqwest::Client,
    feodo_cache: Mutex<Option<FeodoCache>>,
}

impl AbuseChClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client(DEFAULT_TIMEOUT)?,
            feodo_cache: Mutex::new(None),
        })
    }

    /// abuse.ch requires no credentials.
    pub fn is_configured(&self) -> bool {
        true
    }

    /// Check a domain against URLhaus (malware distribution hosts).
    pub async fn check_domain_urlhaus(&self, domain: &str) -> FeedResult<UrlhausResult> {
        let domain = domain.trim().to_lowercase();
        debug!(domain, "URLhaus domain check");

        let response = self
            .http
            .post(format!("{URLHAUS_API}/host/"))
            .form(&[("host", domain.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }

        let data: Value = response.json().await?;
        match data["query_status"].as_str() {
            Some("no_results") => Ok(UrlhausResult::default()),
            Some("ok") => {
                let urls: Vec<UrlhausUrl> = data["urls"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .take(20)
                    .map(|u| UrlhausUrl {
                        url: u["url"].as_str().map(str::to_string),
                        url_status: u["url_status"].as_str().map(str::to_string),
                        threat: u["threat"].as_str().map(str::to_string),
                        tags: string_array(&u["tags"]),
                    })
                    .collect();
                Ok(UrlhausResult {
                    found: true,
                    url_count: urls.len(),
                    urls,
                    urlhaus_link: Some(format!("https://urlhaus.abuse.ch/host/{domain}/")),
                })
            }
            other => Err(FeedError::Parse(format!(
                "unexpected query_status: {other:?}"
            ))),
        }
    }

    /// Check a search term (domain or IP) against ThreatFox.
    pub async fn check_threatfox(&self, term: &str) -> FeedResult<ThreatfoxResult> {
        let term = term.trim().to_lowercase();
        debug!(term, "ThreatFox search");

        let response = self
            .http
            .post(THREATFOX_API)
            .json(&json!({ "query": "search_ioc", "search_term": term }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }

        let data: Value = response.json().await?;
        match data["query_status"].as_str() {
            Some("no_result") => Ok(ThreatfoxResult::default()),
            Some("ok") => {
                let iocs: Vec<ThreatfoxIoc> = data["data"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .take(20)
                    .map(|i| ThreatfoxIoc {
                        ioc: i["ioc"].as_str().map(str::to_string),
                        ioc_type: i["ioc_type"].as_str().map(str::to_string),
                        threat_type: i["threat_type"].as_str().map(str::to_string),
                        malware: i["malware_printable"]
                            .as_str()
                            .or_else(|| i["malware"].as_str())
                            .map(str::to_string),
                        confidence_level: i["confidence_level"].as_u64().map(|c| c as u32),
                        tags: string_array(&i["tags"]),
                    })
                    .collect();
                Ok(ThreatfoxResult {
                    found: true,
                    ioc_count: iocs.len(),
                    iocs,
                })
            }
            other => Err(FeedError::Parse(format!(
                "unexpected query_status: {other:?}"
            ))),
        }
    }

    /// Check an IP against the Feodo Tracker C2 blocklist (cached 24 h).
    pub async fn check_ip_feodo(&self, ip: &str) -> FeedResult<FeodoResult> {
        let ip = ip.trim();
        let ips = self.feodo_c2_list().await?;
        Ok(ips.get(ip).cloned().unwrap_or_default())
    }

    async fn feodo_c2_list(&self) -> FeedResult<Arc<HashMap<String, FeodoResult>>> {
        let mut cache = self.feodo_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.loaded_at.elapsed() < FEODO_CACHE_TTL {
                return Ok(cached.ips.clone());
            }
        }

        let response = self.http.get(FEODO_BLOCKLIST_URL).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }

        let entries: Vec<Value> = response.json().await?;
        let mut ips = HashMap::new();
        for entry in entries {
            let Some(ip) = entry["ip_address"].as_str() else {
                continue;
            };
            ips.insert(
                ip.to_string(),
                FeodoResult {
                    is_c2: true,
                    malware: entry["malware"].as_str().map(str::to_string),
                    port: entry["port"].as_u64().map(|p| p as u16),
                    status: entry["status"].as_str().map(str::to_string),
                },
            );
        }

        info!(count = ips.len(), "loaded Feodo C2 blocklist");
        let ips = Arc::new(ips);
        *cache = Some(FeodoCache {
            loaded_at: Instant::now(),
            ips: ips.clone(),
        });
        Ok(ips)
    }

    /// Check a domain against URLhaus and ThreatFox.
    pub async fn check_domain(&self, domain: &str) -> FeedResult<DomainAbuseSummary> {
        let domain = domain.trim().to_lowercase();
        info!(domain, "abuse.ch domain check");

        let urlhaus = self.check_domain_urlhaus(&domain).await.unwrap_or_else(|e| {
            warn!(domain, error = %e, "URLhaus check failed");
            UrlhausResult::default()
        });
        let threatfox = self.check_threatfox(&domain).await.unwrap_or_else(|e| {
            warn!(domain, error = %e, "ThreatFox check failed");
            ThreatfoxResult::default()
        });

        let mut threat_types = Vec::new();
        if urlhaus.found {
            threat_types.push("malware_distribution".to_string());
        }
        for ioc in &threatfox.iocs {
            if let Some(malware) = &ioc.malware {
                if !threat_types.contains(malware) {
                    threat_types.push(malware.clone());
                }
            }
        }

        Ok(DomainAbuseSummary {
            is_malicious: urlhaus.found || threatfox.found,
            domain,
            threat_types,
            urlhaus,
            threatfox,
        })
    }

    /// Check an IP against ThreatFox and Feodo Tracker.
    pub async fn check_ip(&self, ip: &str) -> FeedResult<IpAbuseSummary> {
        let ip = ip.trim().to_string();
        info!(ip, "abuse.ch IP check");

        let threatfox = self.check_threatfox(&ip).await.unwrap_or_default();
        let feodo = self.check_ip_feodo(&ip).await.unwrap_or_default();

        let mut threat_types = Vec::new();
        if feodo.is_c2 {
            if let Some(malware) = &feodo.malware {
                threat_types.push(format!("C2:{malware}"));
            }
        }

        Ok(IpAbuseSummary {
            is_malicious: threatfox.found || feodo.is_c2,
            is_c2: feodo.is_c2,
            ip,
            threat_types,
            threatfox,
            feodo,
        })
    }

    /// Check the active lookalike set.
    pub async fn bulk_check_domains(&self, domains: &[String]) -> FeedResult<AbusechBulkResult> {
        let mut result = AbusechBulkResult::default();

        for domain in domains {
            let summary = self.check_domain(domain).await?;
            result.domains_checked += 1;
            if summary.is_malicious {
                result.malicious_domains.push(summary);
            } else {
                result.clean_domains.push(summary.domain);
            }
        }

        info!(
            checked = result.domains_checked,
            malicious = result.malicious_domains.len(),
            "abuse.ch bulk check complete"
        );
        Ok(result)
    }
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
