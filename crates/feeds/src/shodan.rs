//! Shodan adapter for infrastructure exposure
//!
//! Looks up the seed domain's resolved IPs (capped at 3 to conserve query
//! credits) and flags risky exposed services and known vulnerabilities.
//! A 402 maps to `FeedError::CreditsExhausted`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const SHODAN_API_BASE: &str = "https://api.shodan.io";

/// IPs checked per seed domain to conserve credits.
pub const MAX_IPS_PER_DOMAIN: usize = 3;

/// One service observed on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShodanService {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// Host-level lookup result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShodanHost {
    pub ip: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub vulns: Vec<String>,
    #[serde(default)]
    pub services: Vec<ShodanService>,
}

/// An exposed service flagged as risky.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExposedService {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub risk_reason: String,
}

/// Infrastructure summary for a seed domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShodanInfra {
    pub domain: String,
    pub ips_checked: usize,
    pub total_ports: usize,
    pub total_vulns: usize,
    pub exposed_services: Vec<ExposedService>,
    pub vulnerabilities: Vec<String>,
    pub hosts: Vec<ShodanHost>,
    /// Set when the lookup stopped early on exhausted credits or a rate
    /// limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_early: Option<String>,
}

pub struct ShodanClient {
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ShodanClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            http: http_client(DEFAULT_TIMEOUT)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get(&self, endpoint: &str) -> FeedResult<Value> {
        let api_key = self.api_key.as_deref().ok_or(FeedError::NotConfigured)?;
        debug!(endpoint, "Shodan request");

        let response = self
            .http
            .get(format!("{SHODAN_API_BASE}/{endpoint}"))
            .query(&[("key", api_key)])
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(response.json().await?),
            401 => Err(FeedError::Http("invalid API key".into())),
            402 => Err(FeedError::CreditsExhausted),
            404 => Err(FeedError::Http("not found in Shodan".into())),
            429 => Err(FeedError::RateLimited),
            status => Err(FeedError::Status(status)),
        }
    }

    /// Remaining query credits, checked before spending any on a run.
    pub async fn query_credits(&self) -> FeedResult<u64> {
        let info = self.get("api-info").await?;
        Ok(info["query_credits"].as_u64().unwrap_or(0))
    }

    /// Look up one host.
    pub async fn lookup_ip(&self, ip: &str) -> FeedResult<ShodanHost> {
        let data = self.get(&format!("shodan/host/{ip}")).await?;

        let services = data["data"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| ShodanService {
                port: item["port"].as_u64().map(|p| p as u16),
                protocol: item["transport"].as_str().unwrap_or("tcp").to_string(),
                product: item["product"].as_str().map(str::to_string),
                version: item["version"].as_str().map(str::to_string),
                module: item["_shodan"]["module"].as_str().map(str::to_string),
            })
            .collect();

        Ok(ShodanHost {
            ip: ip.to_string(),
            hostnames: string_array(&data["hostnames"]),
            org: data["org"].as_str().map(str::to_string),
            isp: data["isp"].as_str().map(str::to_string),
            country: data["country_name"].as_str().map(str::to_string),
            ports: data["ports"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_u64().map(|p| p as u16))
                .collect(),
            vulns: string_array(&data["vulns"]),
            services,
        })
    }

    /// Look up a seed domain's infrastructure through its resolved IPs.
    pub async fn lookup_domain(&self, domain: &str, ips: &[String]) -> FeedResult<ShodanInfra> {
        if self.api_key.is_none() {
            return Err(FeedError::NotConfigured);
        }
        if ips.is_empty() {
            return Err(FeedError::Http("no IP addresses resolved".into()));
        }
        if self.query_credits().await? < 1 {
            return Err(FeedError::CreditsExhausted);
        }

        info!(domain, "Shodan infrastructure lookup");
        let mut result = ShodanInfra {
            domain: domain.to_string(),
            ..Default::default()
        };

        for ip in ips.iter().take(MAX_IPS_PER_DOMAIN) {
            let host = match self.lookup_ip(ip).await {
                Ok(h) => h,
                Err(e) if e.stops_stage() => {
                    // Keep the hosts already collected; record the reason.
                    warn!(ip = %ip, error = %e, "Shodan stopping early");
                    result.stopped_early = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    debug!(ip = %ip, error = %e, "Shodan host lookup failed");
                    continue;
                }
            };
            result.ips_checked += 1;
            result.total_ports += host.ports.len();
            result.total_vulns += host.vulns.len();
            result.vulnerabilities.extend(host.vulns.iter().cloned());

            for service in &host.services {
                if let Some(reason) = risky_service_reason(service) {
                    result.exposed_services.push(ExposedService {
                        ip: host.ip.clone(),
                        port: service.port,
                        product: service.product.clone(),
                        risk_reason: reason.to_string(),
                    });
                }
            }

            result.hosts.push(host);
        }

        Ok(result)
    }
}

/// Flag remote-access, database, and admin interfaces exposed to the world.
fn risky_service_reason(service: &ShodanService) -> Option<&'static str> {
    match service.port {
        Some(21) | Some(23) | Some(3389) | Some(5900) => {
            return Some("Remote access service exposed")
        }
        Some(1433) | Some(3306) | Some(5432) | Some(27017) | Some(6379) => {
            return Some("Database port exposed")
        }
        _ => {}
    }

    let product = service.product.as_deref().unwrap_or("").to_lowercase();
    let module = service.module.as_deref().unwrap_or("").to_lowercase();
    if product.contains("admin") || module.contains("management") {
        return Some("Admin/management interface exposed");
    }

    None
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(port: u16, product: Option<&str>, module: Option<&str>) -> ShodanService {
        ShodanService {
            port: Some(port),
            protocol: "tcp".into(),
            product: product.map(str::to_string),
            version: None,
            module: module.map(str::to_string),
        }
    }

    #[test]
    fn test_risky_services() {
        assert!(risky_service_reason(&service(3389, None, None)).is_some());
        assert!(risky_service_reason(&service(3306, None, None)).is_some());
        assert!(risky_service_reason(&service(8080, Some("Router Admin Panel"), None)).is_some());
        assert!(risky_service_reason(&service(443, Some("nginx"), Some("https"))).is_none());
        // SSH is often intentional, not flagged.
        assert!(risky_service_reason(&service(22, Some("OpenSSH"), None)).is_none());
    }
}
