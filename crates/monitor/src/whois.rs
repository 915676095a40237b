//! WHOIS change monitoring
//!
//! Tracks registration data for active lookalikes between runs. Registrant
//! and nameserver changes on a lookalike are takeover / re-arming
//! indicators; the per-candidate history lives in its own state directory
//! beside the snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use watchtower_core::model::{WhoisFieldChange, WhoisSeverity};
use watchtower_feeds::rdap::{RdapClient, WhoisInfo};
use watchtower_feeds::FeedResult;

/// Change check result for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhoisChangeResult {
    pub domain: String,
    pub is_first_scan: bool,
    pub has_changes: bool,
    pub change_severity: WhoisSeverity,
    pub changes: Vec<WhoisFieldChange>,
    pub info: WhoisInfo,
}

/// A domain whose registration appeared or mutated in a worrying way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HighSeverityChange {
    pub domain: String,
    pub changes: Vec<WhoisFieldChange>,
}

/// Scan result across the active lookalike set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WhoisScanResult {
    pub domains_scanned: usize,
    pub domains_with_changes: usize,
    pub high_severity_changes: Vec<HighSeverityChange>,
    pub newly_registered: Vec<String>,
    pub details: BTreeMap<String, WhoisChangeResult>,
}

pub struct WhoisMonitor {
    dir: PathBuf,
}

impl WhoisMonitor {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create WHOIS state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn state_file(&self, domain: &str) -> PathBuf {
        let safe_name = domain.replace('.', "_");
        self.dir.join(format!("{safe_name}.json"))
    }

    fn load_previous(&self, domain: &str) -> Option<WhoisInfo> {
        let path = self.state_file(domain);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(info) => Some(info),
                Err(e) => {
                    error!(domain, error = %e, "corrupt WHOIS state, treating as first scan");
                    None
                }
            },
            Err(e) => {
                error!(domain, error = %e, "unreadable WHOIS state, treating as first scan");
                None
            }
        }
    }

    fn save(&self, domain: &str, info: &WhoisInfo) -> Result<()> {
        let path = self.state_file(domain);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(info)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Look up current registration data and diff it against the stored
    /// state, then persist the new state.
    pub async fn check_for_changes(
        &self,
        rdap: &RdapClient,
        domain: &str,
    ) -> FeedResult<WhoisChangeResult> {
        let current = rdap.lookup(domain).await?;
        let previous = self.load_previous(domain);
        let is_first_scan = previous.is_none();

        let changes = match &previous {
            Some(prev) => diff_whois(prev, &current),
            None => Vec::new(),
        };
        let change_severity = changes
            .iter()
            .map(|c| c.severity)
            .max()
            .unwrap_or(WhoisSeverity::None);

        if let Err(e) = self.save(domain, &current) {
            error!(domain, error = %e, "failed to save WHOIS state");
        }

        if !changes.is_empty() {
            info!(
                domain,
                count = changes.len(),
                severity = ?change_severity,
                "WHOIS changes detected"
            );
        }

        Ok(WhoisChangeResult {
            domain: domain.to_string(),
            is_first_scan,
            has_changes: !changes.is_empty(),
            change_severity,
            changes,
            info: current,
        })
    }

    /// Scan the active lookalike set for WHOIS changes.
    pub async fn scan_domains(&self, rdap: &RdapClient, domains: &[String]) -> WhoisScanResult {
        let mut result = WhoisScanResult {
            domains_scanned: domains.len(),
            ..Default::default()
        };

        for domain in domains {
            let check = match self.check_for_changes(rdap, domain).await {
                Ok(check) => check,
                Err(e) => {
                    error!(domain, error = %e, "WHOIS change check failed");
                    continue;
                }
            };

            if check.has_changes {
                result.domains_with_changes += 1;
                if check.change_severity == WhoisSeverity::High {
                    result.high_severity_changes.push(HighSeverityChange {
                        domain: domain.clone(),
                        changes: check.changes.clone(),
                    });
                }
            }
            if check.info.is_newly_registered {
                result.newly_registered.push(domain.clone());
            }
            result.details.insert(domain.clone(), check);
        }

        info!(
            with_changes = result.domains_with_changes,
            scanned = result.domains_scanned,
            high_severity = result.high_severity_changes.len(),
            "WHOIS scan complete"
        );
        result
    }
}

/// Field-by-field WHOIS comparison with severities.
pub fn diff_whois(previous: &WhoisInfo, current: &WhoisInfo) -> Vec<WhoisFieldChange> {
    let mut changes = Vec::new();

    // Registration appearing out of nothing is the strongest change.
    if current.registered && !previous.registered {
        changes.push(WhoisFieldChange {
            field: "registration".into(),
            previous: Some("not_registered".into()),
            current: Some("registered".into()),
            added: Vec::new(),
            removed: Vec::new(),
            severity: WhoisSeverity::High,
        });
        return changes;
    }
    if !current.registered || !previous.registered {
        return changes;
    }

    if previous.registrar != current.registrar {
        changes.push(WhoisFieldChange {
            field: "registrar".into(),
            previous: previous.registrar.clone(),
            current: current.registrar.clone(),
            added: Vec::new(),
            removed: Vec::new(),
            severity: WhoisSeverity::Medium,
        });
    }

    let prev_ns: std::collections::BTreeSet<&String> = previous.name_servers.iter().collect();
    let curr_ns: std::collections::BTreeSet<&String> = current.name_servers.iter().collect();
    if prev_ns != curr_ns {
        changes.push(WhoisFieldChange {
            field: "name_servers".into(),
            previous: Some(previous.name_servers.join(", ")),
            current: Some(current.name_servers.join(", ")),
            added: curr_ns.difference(&prev_ns).map(|s| (*s).clone()).collect(),
            removed: prev_ns.difference(&curr_ns).map(|s| (*s).clone()).collect(),
            severity: WhoisSeverity::High,
        });
    }

    if previous.registrant_org != current.registrant_org {
        changes.push(WhoisFieldChange {
            field: "registrant_org".into(),
            previous: previous.registrant_org.clone(),
            current: current.registrant_org.clone(),
            added: Vec::new(),
            removed: Vec::new(),
            severity: WhoisSeverity::High,
        });
    }

    if previous.status != current.status {
        changes.push(WhoisFieldChange {
            field: "status".into(),
            previous: Some(previous.status.join(", ")),
            current: Some(current.status.join(", ")),
            added: Vec::new(),
            removed: Vec::new(),
            severity: WhoisSeverity::Low,
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(registrar: &str, ns: &[&str]) -> WhoisInfo {
        WhoisInfo {
            domain: "acmee.com".into(),
            registered: true,
            registrar: Some(registrar.into()),
            name_servers: ns.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_changes() {
        let prev = info("GoDaddy", &["ns1.godaddy.com"]);
        assert!(diff_whois(&prev, &prev.clone()).is_empty());
    }

    #[test]
    fn test_nameserver_change_is_high_severity() {
        let prev = info("GoDaddy", &["ns1.godaddy.com"]);
        let curr = info("GoDaddy", &["ns1.evil-dns.net"]);
        let changes = diff_whois(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "name_servers");
        assert_eq!(changes[0].severity, WhoisSeverity::High);
        assert_eq!(changes[0].added, vec!["ns1.evil-dns.net"]);
        assert_eq!(changes[0].removed, vec!["ns1.godaddy.com"]);
    }

    #[test]
    fn test_registrar_change_is_medium_severity() {
        let prev = info("GoDaddy", &["ns1.godaddy.com"]);
        let curr = info("Namecheap", &["ns1.godaddy.com"]);
        let changes = diff_whois(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].severity, WhoisSeverity::Medium);
    }

    #[test]
    fn test_registration_appearing_is_high_severity() {
        let prev = WhoisInfo {
            domain: "acmee.com".into(),
            registered: false,
            ..Default::default()
        };
        let curr = info("GoDaddy", &["ns1.godaddy.com"]);
        let changes = diff_whois(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "registration");
        assert_eq!(changes[0].severity, WhoisSeverity::High);
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = WhoisMonitor::new(dir.path()).unwrap();

        let info = info("MarkMonitor Inc.", &["ns1.markmonitor.com"]);
        monitor.save("acmee.com", &info).unwrap();
        assert_eq!(monitor.load_previous("acmee.com"), Some(info));
        assert_eq!(monitor.load_previous("other.com"), None);
    }
}
