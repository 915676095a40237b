//! Monitoring configuration
//!
//! Read-only view of `config.json`: the monitored domain list, per-seed
//! defensive allowlists, per-brand legitimate domains, and the semantic
//! watchlist. A missing or malformed config file is fatal for the run.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-brand monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrandConfig {
    #[serde(default)]
    pub legitimate_domains: Vec<String>,
}

/// Top-level monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitored_domains: Vec<String>,
    /// Seed domain -> confirmed defensive registrations.
    #[serde(default)]
    pub defensive_domains: HashMap<String, Vec<String>>,
    /// Brand base label -> brand settings (keyed by e.g. "acme").
    #[serde(default)]
    pub brand_monitoring: HashMap<String, BrandConfig>,
    /// Seed domain -> semantic impersonation domains to watch in CT logs.
    #[serde(default)]
    pub watchlist: HashMap<String, Vec<String>>,
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Defensive allowlist for a seed domain.
    pub fn defensive_allowlist(&self, seed: &str) -> Vec<String> {
        self.defensive_domains.get(seed).cloned().unwrap_or_default()
    }

    /// Watchlist domains for a seed.
    pub fn watchlist_for(&self, seed: &str) -> Vec<String> {
        self.watchlist.get(seed).cloned().unwrap_or_default()
    }

    /// Legitimate domains to exclude from brand impersonation results.
    ///
    /// Uses the brand config when present, falls back to the defensive
    /// allowlist, and always includes the seed itself first.
    pub fn legitimate_domains(&self, seed: &str) -> Vec<String> {
        let brand = base_label(seed);
        let mut domains = self
            .brand_monitoring
            .get(brand)
            .map(|b| b.legitimate_domains.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.defensive_allowlist(seed));

        if !domains.iter().any(|d| d.eq_ignore_ascii_case(seed)) {
            domains.insert(0, seed.to_string());
        }
        domains
    }
}

/// Base label of a domain: "acme.com" -> "acme".
pub fn base_label(domain: &str) -> &str {
    domain.split('.').next().unwrap_or(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MonitorConfig {
        serde_json::from_str(
            r#"{
                "monitored_domains": ["acme.com"],
                "defensive_domains": {"acme.com": ["acme-careers.com"]},
                "brand_monitoring": {"acme": {"legitimate_domains": ["acme.com", "acme.io"]}},
                "watchlist": {"acme.com": ["acme-loan.com", "secure-acme.net"]}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_base_label() {
        assert_eq!(base_label("acme.com"), "acme");
        assert_eq!(base_label("acme.co.uk"), "acme");
    }

    #[test]
    fn test_legitimate_domains_prefer_brand_config() {
        let config = sample();
        let legit = config.legitimate_domains("acme.com");
        assert_eq!(legit, vec!["acme.com", "acme.io"]);
    }

    #[test]
    fn test_legitimate_domains_fallback_to_defensive() {
        let mut config = sample();
        config.brand_monitoring.clear();
        let legit = config.legitimate_domains("acme.com");
        assert_eq!(legit, vec!["acme.com", "acme-careers.com"]);
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"monitored_domains": ["acme.com"]}"#).unwrap();
        assert!(config.defensive_allowlist("acme.com").is_empty());
        assert!(config.watchlist_for("acme.com").is_empty());
    }
}
