//! Risk classification for lookalike candidates
//!
//! Pure functions over an enriched candidate: defensive-registration
//! detection followed by an ordered risk ladder. Every downstream
//! alert-suppression check keys off the `defensive` outcome.

use tracing::debug;

use crate::config::base_label;
use crate::model::{Candidate, RiskLevel};

/// Registrars that specialize in brand protection. Domains registered
/// through these are almost always defensive holdings of the brand owner.
pub const BRAND_PROTECTION_REGISTRARS: &[&str] = &[
    "markmonitor",
    "csc corporate domains",
    "csc global",
    "safenames",
    "comlaude",
    "nom-iq",
    "clarivate",
    "brandshelter",
    "corsearch",
    "valideus",
    "gandi corporate",
    "corporation service company",
    "ncc group",
    "brand protection",
];

/// Decide whether a lookalike is a defensive registration owned by the
/// monitored organization.
///
/// Signals, in order of authority: the manual allowlist, nameservers under
/// the monitored domain, and brand-protection registrars.
pub fn detect_defensive_registration(
    domain: &str,
    monitored_domain: &str,
    ns_records: &[String],
    registrar: Option<&str>,
    allowlist: &[String],
) -> bool {
    if allowlist.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
        debug!(domain, "defensive: in allowlist");
        return true;
    }

    let monitored_base = base_label(monitored_domain).to_lowercase();
    let monitored_full = monitored_domain.to_lowercase();
    let monitored_full = monitored_full.trim_end_matches('.');

    for ns in ns_records {
        let ns_lower = ns.to_lowercase();
        let ns_lower = ns_lower.trim_end_matches('.');
        if ns_lower.contains(&monitored_base) || ns_lower.contains(monitored_full) {
            debug!(domain, ns = %ns, "defensive: nameserver under monitored domain");
            return true;
        }
    }

    if let Some(registrar) = registrar {
        let registrar_lower = registrar.to_lowercase();
        for bp in BRAND_PROTECTION_REGISTRARS {
            if registrar_lower.contains(bp) {
                debug!(domain, registrar, "defensive: brand protection registrar");
                return true;
            }
        }
    }

    false
}

/// Classify a candidate into a risk level.
///
/// The ladder is evaluated in order; the first matching rung wins:
/// defensive, parked, high_risk (MX present, VT detections, or RF score
/// >= 65), suspicious (resolves or confirmed not parked), unknown.
pub fn classify_candidate(
    candidate: &Candidate,
    monitored_domain: &str,
    defensive_allowlist: &[String],
) -> RiskLevel {
    let is_defensive = detect_defensive_registration(
        &candidate.domain,
        monitored_domain,
        candidate.effective_nameservers(),
        candidate.registrar.as_deref(),
        defensive_allowlist,
    );
    if is_defensive {
        return RiskLevel::Defensive;
    }

    if candidate.parked == Some(true) {
        return RiskLevel::Parked;
    }

    let has_mx = !candidate.dns_mx.is_empty();
    let vt_malicious = candidate
        .vt_reputation
        .as_ref()
        .map(|v| v.malicious)
        .unwrap_or(0);
    let rf_high = candidate.rf_risk_score.unwrap_or(0) >= 65;

    if has_mx || vt_malicious >= 1 || rf_high {
        return RiskLevel::HighRisk;
    }

    if !candidate.dns_a.is_empty() || candidate.parked == Some(false) {
        return RiskLevel::Suspicious;
    }

    RiskLevel::Unknown
}

/// Classify and stamp the result onto the candidate.
pub fn classify_and_mark(
    candidate: &mut Candidate,
    monitored_domain: &str,
    defensive_allowlist: &[String],
) {
    let level = classify_candidate(candidate, monitored_domain, defensive_allowlist);
    candidate.set_risk(level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VtReputation;

    fn candidate(domain: &str) -> Candidate {
        Candidate::new(domain, "homoglyph")
    }

    #[test]
    fn test_allowlist_is_case_insensitive() {
        assert!(detect_defensive_registration(
            "Acme-Careers.com",
            "acme.com",
            &[],
            None,
            &["acme-careers.com".to_string()],
        ));
    }

    #[test]
    fn test_nameserver_under_monitored_domain() {
        assert!(detect_defensive_registration(
            "acmee.com",
            "acme.com",
            &["ns1.acme.com.".to_string()],
            None,
            &[],
        ));
        assert!(!detect_defensive_registration(
            "acmee.com",
            "acme.com",
            &["ns1.cloudflare.com".to_string()],
            None,
            &[],
        ));
    }

    #[test]
    fn test_brand_protection_registrar() {
        assert!(detect_defensive_registration(
            "acmee.com",
            "acme.com",
            &[],
            Some("MarkMonitor Inc."),
            &[],
        ));
    }

    #[test]
    fn test_defensive_beats_mx() {
        // A defensive MX-bearing domain is defensive, not high_risk.
        let mut c = candidate("acme-careers.com");
        c.dns_mx = vec!["mail.acme-careers.com".into()];
        let level = classify_candidate(&c, "acme.com", &["acme-careers.com".to_string()]);
        assert_eq!(level, RiskLevel::Defensive);
    }

    #[test]
    fn test_parked_before_high_risk_signals() {
        let mut c = candidate("acmee.com");
        c.parked = Some(true);
        c.dns_a = vec!["1.2.3.4".into()];
        assert_eq!(classify_candidate(&c, "acme.com", &[]), RiskLevel::Parked);
    }

    #[test]
    fn test_high_risk_rungs() {
        let mut with_mx = candidate("acme-loan.com");
        with_mx.dns_mx = vec!["mail.x".into()];
        assert_eq!(
            classify_candidate(&with_mx, "acme.com", &[]),
            RiskLevel::HighRisk
        );

        let mut with_vt = candidate("acmee.com");
        with_vt.vt_reputation = Some(VtReputation::new(2, 0, 10, 50));
        assert_eq!(
            classify_candidate(&with_vt, "acme.com", &[]),
            RiskLevel::HighRisk
        );

        let mut with_rf = candidate("acmee.com");
        with_rf.rf_risk_score = Some(72);
        assert_eq!(
            classify_candidate(&with_rf, "acme.com", &[]),
            RiskLevel::HighRisk
        );
    }

    #[test]
    fn test_suspicious_and_unknown() {
        let mut active = candidate("acmee.com");
        active.dns_a = vec!["1.2.3.4".into()];
        assert_eq!(
            classify_candidate(&active, "acme.com", &[]),
            RiskLevel::Suspicious
        );

        let mut not_parked = candidate("acmee.com");
        not_parked.parked = Some(false);
        assert_eq!(
            classify_candidate(&not_parked, "acme.com", &[]),
            RiskLevel::Suspicious
        );

        assert_eq!(
            classify_candidate(&candidate("acmee.com"), "acme.com", &[]),
            RiskLevel::Unknown
        );
    }

    #[test]
    fn test_exactly_one_level_assigned() {
        // Every candidate gets exactly one classification from the ladder.
        let mut c = candidate("acmee.com");
        c.dns_a = vec!["1.2.3.4".into()];
        c.dns_mx = vec!["mail.x".into()];
        c.parked = Some(false);
        c.rf_risk_score = Some(80);
        // Multiple rungs match; the highest-precedence one wins.
        assert_eq!(classify_candidate(&c, "acme.com", &[]), RiskLevel::HighRisk);
    }
}
