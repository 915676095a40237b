//! Data model for domain monitoring
//!
//! The types here form the persistence and reporting contract: snapshots are
//! written to the state store as JSON, change events and feed results end up
//! in the daily run report consumed by the dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk classification for a lookalike candidate.
///
/// The ladder is ordered: `defensive` beats everything else, so a defensive
/// registration with MX records stays `defensive`, never `high_risk`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Defensive,
    Parked,
    Suspicious,
    HighRisk,
    #[default]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Defensive => "defensive",
            RiskLevel::Parked => "parked",
            RiskLevel::Suspicious => "suspicious",
            RiskLevel::HighRisk => "high_risk",
            RiskLevel::Unknown => "unknown",
        }
    }
}

/// Confidence attached to a parking verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Recorded Future risk banding, derived from the 0-99 risk score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RfRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RfRiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 90 => RfRiskLevel::Critical,
            s if s >= 65 => RfRiskLevel::High,
            s if s >= 25 => RfRiskLevel::Medium,
            _ => RfRiskLevel::Low,
        }
    }
}

/// VirusTotal detection banding derived from analysis stats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum VtThreatLevel {
    High,
    Medium,
    Low,
    Clean,
}

impl VtThreatLevel {
    pub fn from_stats(malicious: u32, suspicious: u32) -> Self {
        if malicious >= 3 {
            VtThreatLevel::High
        } else if malicious >= 1 || suspicious >= 3 {
            VtThreatLevel::Medium
        } else if suspicious >= 1 {
            VtThreatLevel::Low
        } else {
            VtThreatLevel::Clean
        }
    }
}

/// VirusTotal reputation summary for a single domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VtReputation {
    pub malicious: u32,
    pub suspicious: u32,
    pub harmless: u32,
    pub undetected: u32,
    pub threat_level: VtThreatLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vt_link: Option<String>,
}

impl VtReputation {
    pub fn new(malicious: u32, suspicious: u32, harmless: u32, undetected: u32) -> Self {
        Self {
            malicious,
            suspicious,
            harmless,
            undetected,
            threat_level: VtThreatLevel::from_stats(malicious, suspicious),
            registrar: None,
            vt_link: None,
        }
    }
}

/// A single lookalike domain discovered for a monitored seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Candidate {
    pub domain: String,
    /// Which fuzzer produced this candidate (e.g. `homoglyph`, `tld-swap`,
    /// `ct-brand-impersonation`).
    pub fuzzer: String,

    #[serde(default)]
    pub dns_a: Vec<String>,
    #[serde(default)]
    pub dns_aaaa: Vec<String>,
    #[serde(default)]
    pub dns_mx: Vec<String>,
    #[serde(default)]
    pub dns_ns: Vec<String>,
    #[serde(default)]
    pub geoip: String,
    pub registered: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whois_name_servers: Vec<String>,

    /// Tri-state parking status: `Some(true)` parked, `Some(false)` active,
    /// `None` undetermined.
    pub parked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking_confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parking_indicators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking_final_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vt_reputation: Option<VtReputation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rf_risk_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rf_risk_level: Option<RfRiskLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rf_rules: Vec<String>,

    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub is_defensive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(domain: impl Into<String>, fuzzer: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            fuzzer: fuzzer.into(),
            ..Default::default()
        }
    }

    /// A candidate counts as registered when any of A/AAAA/MX resolved.
    pub fn recompute_registered(&mut self) {
        self.registered =
            !self.dns_a.is_empty() || !self.dns_aaaa.is_empty() || !self.dns_mx.is_empty();
    }

    /// Nameservers to use for ownership checks: live DNS first, WHOIS as
    /// fallback for domains whose NS lookup failed.
    pub fn effective_nameservers(&self) -> &[String] {
        if !self.dns_ns.is_empty() {
            &self.dns_ns
        } else {
            &self.whois_name_servers
        }
    }

    pub fn set_risk(&mut self, level: RiskLevel) {
        self.risk_level = level;
        self.is_defensive = level == RiskLevel::Defensive;
    }
}

/// Risk level tallies across a candidate set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RiskCounts {
    pub defensive: usize,
    pub parked: usize,
    pub suspicious: usize,
    pub high_risk: usize,
    pub unknown: usize,
}

impl RiskCounts {
    pub fn tally<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> Self {
        let mut counts = Self::default();
        for c in candidates {
            match c.risk_level {
                RiskLevel::Defensive => counts.defensive += 1,
                RiskLevel::Parked => counts.parked += 1,
                RiskLevel::Suspicious => counts.suspicious += 1,
                RiskLevel::HighRisk => counts.high_risk += 1,
                RiskLevel::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Candidates that warrant analyst attention.
    pub fn actionable(&self) -> usize {
        self.suspicious + self.high_risk
    }
}

/// Per-seed scan state persisted between runs. Only the last snapshot is
/// kept; history lives in the daily run reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registered_domains: BTreeMap<String, Candidate>,
    #[serde(default)]
    pub total_registered: usize,
    #[serde(default)]
    pub risk_counts: RiskCounts,
}

impl Snapshot {
    pub fn is_first_scan(&self) -> bool {
        self.last_scan.is_none()
    }
}

/// Severity of a single WHOIS field change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum WhoisSeverity {
    None,
    Low,
    Medium,
    High,
}

/// One changed WHOIS field with before/after values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhoisFieldChange {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    pub severity: WhoisSeverity,
}

/// A typed change detected between the previous and current snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "change_type", rename_all = "snake_case")]
pub enum ChangeEvent {
    NewRegistration {
        candidate: Candidate,
    },
    /// Parked -> active transition, the strongest single pre-attack signal.
    BecameActive {
        candidate: Candidate,
    },
    BecameParked {
        candidate: Candidate,
    },
    IpChange {
        candidate: Candidate,
        previous_ips: Vec<String>,
        current_ips: Vec<String>,
        added_ips: Vec<String>,
        removed_ips: Vec<String>,
    },
    /// MX records appeared where there were none: potential phishing setup.
    MxNew {
        candidate: Candidate,
        new_mx_records: Vec<String>,
    },
    MxChange {
        candidate: Candidate,
        previous_mx: Vec<String>,
        current_mx: Vec<String>,
    },
    GeoipChange {
        candidate: Candidate,
        previous_geoip: String,
        current_geoip: String,
    },
    WhoisChange {
        domain: String,
        is_defensive: bool,
        changes: Vec<WhoisFieldChange>,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::NewRegistration { .. } => "new_registration",
            ChangeEvent::BecameActive { .. } => "became_active",
            ChangeEvent::BecameParked { .. } => "became_parked",
            ChangeEvent::IpChange { .. } => "ip_change",
            ChangeEvent::MxNew { .. } => "mx_new",
            ChangeEvent::MxChange { .. } => "mx_change",
            ChangeEvent::GeoipChange { .. } => "geoip_change",
            ChangeEvent::WhoisChange { .. } => "whois_change",
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            ChangeEvent::NewRegistration { candidate }
            | ChangeEvent::BecameActive { candidate }
            | ChangeEvent::BecameParked { candidate }
            | ChangeEvent::IpChange { candidate, .. }
            | ChangeEvent::MxNew { candidate, .. }
            | ChangeEvent::MxChange { candidate, .. }
            | ChangeEvent::GeoipChange { candidate, .. } => &candidate.domain,
            ChangeEvent::WhoisChange { domain, .. } => domain,
        }
    }

    /// Defensive registrations are suppressed from actionable counters.
    pub fn is_defensive(&self) -> bool {
        match self {
            ChangeEvent::NewRegistration { candidate }
            | ChangeEvent::BecameActive { candidate }
            | ChangeEvent::BecameParked { candidate }
            | ChangeEvent::IpChange { candidate, .. }
            | ChangeEvent::MxNew { candidate, .. }
            | ChangeEvent::MxChange { candidate, .. }
            | ChangeEvent::GeoipChange { candidate, .. } => candidate.is_defensive,
            ChangeEvent::WhoisChange { is_defensive, .. } => *is_defensive,
        }
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(
            self,
            ChangeEvent::BecameActive { .. } | ChangeEvent::MxNew { .. }
        )
    }
}

/// Outcome of a single enrichment stage as it appears in the run report.
///
/// Every feed section carries `success` plus either a typed payload
/// (flattened) or an `error` string. A feed without credentials reports
/// `{"success": false, "error": "not configured"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedReport<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> FeedReport<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn not_configured() -> Self {
        Self::err("not configured")
    }

    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rf_risk_banding() {
        assert_eq!(RfRiskLevel::from_score(95), RfRiskLevel::Critical);
        assert_eq!(RfRiskLevel::from_score(90), RfRiskLevel::Critical);
        assert_eq!(RfRiskLevel::from_score(65), RfRiskLevel::High);
        assert_eq!(RfRiskLevel::from_score(64), RfRiskLevel::Medium);
        assert_eq!(RfRiskLevel::from_score(25), RfRiskLevel::Medium);
        assert_eq!(RfRiskLevel::from_score(0), RfRiskLevel::Low);
    }

    #[test]
    fn test_vt_threat_banding() {
        assert_eq!(VtThreatLevel::from_stats(3, 0), VtThreatLevel::High);
        assert_eq!(VtThreatLevel::from_stats(1, 0), VtThreatLevel::Medium);
        assert_eq!(VtThreatLevel::from_stats(0, 3), VtThreatLevel::Medium);
        assert_eq!(VtThreatLevel::from_stats(0, 1), VtThreatLevel::Low);
        assert_eq!(VtThreatLevel::from_stats(0, 0), VtThreatLevel::Clean);
    }

    #[test]
    fn test_registered_invariant() {
        let mut c = Candidate::new("acme-loan.com", "homoglyph");
        c.recompute_registered();
        assert!(!c.registered);

        c.dns_mx = vec!["mail.acme-loan.com".into()];
        c.recompute_registered();
        assert!(c.registered);

        c.dns_mx.clear();
        c.dns_a = vec!["1.2.3.4".into()];
        c.recompute_registered();
        assert!(c.registered);
    }

    #[test]
    fn test_change_event_serialization_tag() {
        let event = ChangeEvent::BecameActive {
            candidate: Candidate::new("acme-login.com", "insertion"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["change_type"], "became_active");
        assert_eq!(json["candidate"]["domain"], "acme-login.com");
    }

    #[test]
    fn test_feed_report_shapes() {
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
        struct Payload {
            count: usize,
        }

        let ok = FeedReport::ok(Payload { count: 3 });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 3);

        let nc: FeedReport<Payload> = FeedReport::not_configured();
        let json = serde_json::to_value(&nc).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "not configured");
    }

    #[test]
    fn test_risk_counts_actionable() {
        let mut a = Candidate::new("a.com", "omission");
        a.set_risk(RiskLevel::HighRisk);
        let mut b = Candidate::new("b.com", "omission");
        b.set_risk(RiskLevel::Defensive);
        let mut c = Candidate::new("c.com", "omission");
        c.set_risk(RiskLevel::Suspicious);

        let counts = RiskCounts::tally([&a, &b, &c]);
        assert_eq!(counts.high_risk, 1);
        assert_eq!(counts.defensive, 1);
        assert_eq!(counts.actionable(), 2);
    }
}
