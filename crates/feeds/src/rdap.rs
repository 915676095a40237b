//! Registration data lookup over RDAP
//!
//! RDAP is the JSON successor to port-43 WHOIS and rides on the same HTTP
//! stack as every other adapter. The rdap.org bootstrap redirects to the
//! authoritative registry for each TLD. Output is normalized into a flat
//! record the diff engine and defensive detection can consume.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{http_client, FeedError, FeedResult, DEFAULT_TIMEOUT};

const RDAP_BOOTSTRAP_URL: &str = "https://rdap.org/domain";

/// Days within which a registration counts as new.
const NEWLY_REGISTERED_DAYS: i64 = 30;

/// Normalized registration data for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WhoisInfo {
    pub domain: String,
    pub registered: bool,
    pub is_newly_registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrant_org: Option<String>,
    #[serde(default)]
    pub name_servers: Vec<String>,
    #[serde(default)]
    pub status: Vec<String>,
}

pub struct RdapClient {
    http: reqwest::Client,
}

impl RdapClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// RDAP is open infrastructure; no credentials needed.
    pub fn is_configured(&self) -> bool {
        true
    }

    /// Look up registration data for a domain. An unregistered domain is a
    /// successful lookup with `registered: false`, not an error.
    pub async fn lookup(&self, domain: &str) -> FeedResult<WhoisInfo> {
        let domain = domain.trim().to_lowercase();
        debug!(domain, "RDAP lookup");

        let response = self
            .http
            .get(format!("{RDAP_BOOTSTRAP_URL}/{domain}"))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            404 => {
                return Ok(WhoisInfo {
                    domain,
                    ..Default::default()
                })
            }
            429 => return Err(FeedError::RateLimited),
            status => return Err(FeedError::Status(status)),
        }

        let body: Value = response.json().await?;
        let info = normalize_rdap(&domain, &body);
        info!(
            domain,
            registrar = info.registrar.as_deref().unwrap_or("-"),
            new = info.is_newly_registered,
            "RDAP lookup complete"
        );
        Ok(info)
    }
}

fn normalize_rdap(domain: &str, body: &Value) -> WhoisInfo {
    let mut info = WhoisInfo {
        domain: domain.to_string(),
        registered: true,
        ..Default::default()
    };

    for event in body["events"].as_array().into_iter().flatten() {
        let date = event["eventDate"].as_str().map(str::to_string);
        match event["eventAction"].as_str() {
            Some("registration") => info.creation_date = date,
            Some("expiration") => info.expiration_date = date,
            Some("last changed") => info.updated_date = date,
            _ => {}
        }
    }

    for entity in body["entities"].as_array().into_iter().flatten() {
        let roles: Vec<&str> = entity["roles"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|r| r.as_str())
            .collect();
        if roles.contains(&"registrar") {
            info.registrar = vcard_full_name(entity);
        } else if roles.contains(&"registrant") {
            info.registrant_org = vcard_org(entity).or_else(|| vcard_full_name(entity));
        }
    }

    info.name_servers = body["nameservers"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|ns| ns["ldhName"].as_str())
        .map(|ns| ns.trim_end_matches('.').to_lowercase())
        .collect();
    info.name_servers.sort();

    info.status = body["status"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|s| s.as_str().map(str::to_string))
        .collect();

    if let Some(created) = info
        .creation_date
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
    {
        let age = Utc::now().signed_duration_since(created.with_timezone(&Utc));
        info.is_newly_registered = age.num_days() <= NEWLY_REGISTERED_DAYS;
    }

    info
}

/// Pull the `fn` property out of a jCard array.
fn vcard_full_name(entity: &Value) -> Option<String> {
    vcard_property(entity, "fn")
}

fn vcard_org(entity: &Value) -> Option<String> {
    vcard_property(entity, "org")
}

fn vcard_property(entity: &Value, name: &str) -> Option<String> {
    entity["vcardArray"][1]
        .as_array()?
        .iter()
        .find(|prop| prop[0].as_str() == Some(name))
        .and_then(|prop| prop[3].as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_rdap_response() {
        let body = json!({
            "events": [
                {"eventAction": "registration", "eventDate": "2024-01-10T00:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2025-01-10T00:00:00Z"}
            ],
            "entities": [
                {
                    "roles": ["registrar"],
                    "vcardArray": ["vcard", [["version", {}, "text", "4.0"], ["fn", {}, "text", "MarkMonitor Inc."]]]
                }
            ],
            "nameservers": [
                {"ldhName": "NS2.MARKMONITOR.COM."},
                {"ldhName": "ns1.markmonitor.com"}
            ],
            "status": ["client transfer prohibited"]
        });

        let info = normalize_rdap("acme-careers.com", &body);
        assert!(info.registered);
        assert_eq!(info.registrar.as_deref(), Some("MarkMonitor Inc."));
        assert_eq!(
            info.name_servers,
            vec!["ns1.markmonitor.com", "ns2.markmonitor.com"]
        );
        assert_eq!(info.creation_date.as_deref(), Some("2024-01-10T00:00:00Z"));
        assert_eq!(info.status, vec!["client transfer prohibited"]);
    }

    #[test]
    fn test_vcard_property_missing() {
        let entity = json!({"vcardArray": ["vcard", []]});
        assert!(vcard_full_name(&entity).is_none());
    }
}
