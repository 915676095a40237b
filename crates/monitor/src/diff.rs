//! Snapshot diff engine
//!
//! Computes typed change events between the previous snapshot and the
//! current candidate map. The comparison itself is a pure function of its
//! inputs with stable, domain-sorted event order; WHOIS lookups for new
//! registrations are injected so the core stays deterministic and testable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use watchtower_core::model::{Candidate, ChangeEvent, Snapshot};
use watchtower_core::risk::classify_and_mark;
use watchtower_feeds::rdap::RdapClient;

/// WHOIS back-fill budget per run for existing candidates, bounding
/// external WHOIS load.
pub const WHOIS_BACKFILL_CAP: usize = 10;

/// Per-type event tallies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChangeCounts {
    pub new_registrations: usize,
    pub became_active: usize,
    pub became_parked: usize,
    pub ip_changes: usize,
    pub mx_changes: usize,
    pub geoip_changes: usize,
}

/// Diff result: ordered events plus summary data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiffOutcome {
    pub events: Vec<ChangeEvent>,
    pub counts: ChangeCounts,
    pub removed_domains: Vec<String>,
}

impl DiffOutcome {
    /// Domains that newly appeared or turned active this run; the subject
    /// set for the per-candidate enrichment stages.
    pub fn changed_domains(&self) -> Vec<String> {
        let mut domains = Vec::new();
        for event in &self.events {
            if matches!(
                event,
                ChangeEvent::NewRegistration { .. } | ChangeEvent::BecameActive { .. }
            ) && !domains.iter().any(|d| d == event.domain())
            {
                domains.push(event.domain().to_string());
            }
        }
        domains
    }

    pub fn became_active_domains(&self) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| matches!(e, ChangeEvent::BecameActive { .. }))
            .map(|e| e.domain().to_string())
            .collect()
    }
}

/// Carry WHOIS fields forward from the previous snapshot so registrar-based
/// defensive detection keeps working without refetching every run.
pub fn merge_previous_whois(previous: &Snapshot, current: &mut BTreeMap<String, Candidate>) {
    for (domain, candidate) in current.iter_mut() {
        let Some(prev) = previous.registered_domains.get(domain) else {
            continue;
        };
        if candidate.registrar.is_none() {
            candidate.registrar = prev.registrar.clone();
        }
        if candidate.registration_date.is_none() {
            candidate.registration_date = prev.registration_date.clone();
        }
        if candidate.whois_name_servers.is_empty() {
            candidate.whois_name_servers = prev.whois_name_servers.clone();
        }
        if candidate.first_seen.is_none() {
            candidate.first_seen = prev.first_seen;
        }
    }
}

/// Lazily fetch WHOIS for existing candidates still missing registrar data,
/// capped per run.
pub async fn backfill_missing_whois(
    rdap: &RdapClient,
    previous: &Snapshot,
    current: &mut BTreeMap<String, Candidate>,
) {
    let missing: Vec<String> = current
        .iter()
        .filter(|(domain, c)| {
            previous.registered_domains.contains_key(*domain) && c.registrar.is_none()
        })
        .map(|(domain, _)| domain.clone())
        .take(WHOIS_BACKFILL_CAP)
        .collect();

    if missing.is_empty() {
        return;
    }
    info!(count = missing.len(), "back-filling WHOIS for existing candidates");

    for domain in missing {
        match rdap.lookup(&domain).await {
            Ok(whois) if whois.registered => {
                if let Some(candidate) = current.get_mut(&domain) {
                    candidate.registrar = whois.registrar;
                    candidate.registration_date = whois.creation_date;
                    candidate.whois_name_servers = whois.name_servers;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(domain, error = %e, "WHOIS back-fill failed"),
        }
    }
}

/// Diff the previous snapshot against the current candidate map.
///
/// New registrations get a best-effort WHOIS fetch (when a client is
/// provided) and are re-classified with the registrar in hand so
/// `is_defensive` is final on the emitted event. Pass `None` for a fully
/// pure diff.
pub async fn diff_snapshots(
    previous: &Snapshot,
    current: &mut BTreeMap<String, Candidate>,
    seed: &str,
    defensive_allowlist: &[String],
    scan_time: DateTime<Utc>,
    rdap: Option<&RdapClient>,
) -> DiffOutcome {
    let previous_names: BTreeSet<&String> = previous.registered_domains.keys().collect();
    let current_names: BTreeSet<String> = current.keys().cloned().collect();

    let mut outcome = DiffOutcome::default();

    // Removed domains (expired or taken down).
    outcome.removed_domains = previous_names
        .iter()
        .filter(|d| !current_names.contains(d.as_str()))
        .map(|d| (*d).clone())
        .collect();

    // BTreeMap iteration gives stable, domain-sorted event order.
    for domain in &current_names {
        let is_new = !previous.registered_domains.contains_key(domain);

        if is_new {
            if let Some(candidate) = current.get_mut(domain) {
                candidate.first_seen = Some(scan_time);
            }

            if let Some(rdap) = rdap {
                match rdap.lookup(domain).await {
                    Ok(whois) if whois.registered => {
                        if let Some(candidate) = current.get_mut(domain) {
                            candidate.registrar = whois.registrar;
                            candidate.registration_date = whois.creation_date;
                            candidate.whois_name_servers = whois.name_servers;
                            // Registrar may flip the verdict to defensive.
                            classify_and_mark(candidate, seed, defensive_allowlist);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(domain, error = %e, "WHOIS lookup for new registration failed")
                    }
                }
            }

            if let Some(candidate) = current.get(domain) {
                outcome.counts.new_registrations += 1;
                outcome.events.push(ChangeEvent::NewRegistration {
                    candidate: candidate.clone(),
                });
            }
            continue;
        }

        let (Some(prev), Some(curr)) = (previous.registered_domains.get(domain), current.get(domain))
        else {
            continue;
        };

        // Parking transitions on the tri-state; unknown never transitions.
        match (prev.parked, curr.parked) {
            (Some(true), Some(false)) => {
                warn!(domain, "HIGH PRIORITY: parked domain became active");
                outcome.counts.became_active += 1;
                outcome.events.push(ChangeEvent::BecameActive {
                    candidate: curr.clone(),
                });
            }
            (Some(false), Some(true)) => {
                outcome.counts.became_parked += 1;
                outcome.events.push(ChangeEvent::BecameParked {
                    candidate: curr.clone(),
                });
            }
            _ => {}
        }

        // IP changes require both sides to have addresses.
        let prev_ips: BTreeSet<&String> = prev.dns_a.iter().collect();
        let curr_ips: BTreeSet<&String> = curr.dns_a.iter().collect();
        if !prev_ips.is_empty() && !curr_ips.is_empty() && prev_ips != curr_ips {
            outcome.counts.ip_changes += 1;
            outcome.events.push(ChangeEvent::IpChange {
                candidate: curr.clone(),
                previous_ips: prev.dns_a.clone(),
                current_ips: curr.dns_a.clone(),
                added_ips: curr_ips.difference(&prev_ips).map(|s| (*s).clone()).collect(),
                removed_ips: prev_ips.difference(&curr_ips).map(|s| (*s).clone()).collect(),
            });
        }

        // MX appearing from nothing is new email infrastructure.
        let prev_mx: BTreeSet<&String> = prev.dns_mx.iter().collect();
        let curr_mx: BTreeSet<&String> = curr.dns_mx.iter().collect();
        if prev_mx.is_empty() && !curr_mx.is_empty() {
            warn!(domain, mx = ?curr.dns_mx, "new MX records appeared");
            outcome.counts.mx_changes += 1;
            outcome.events.push(ChangeEvent::MxNew {
                candidate: curr.clone(),
                new_mx_records: curr.dns_mx.clone(),
            });
        } else if !prev_mx.is_empty() && !curr_mx.is_empty() && prev_mx != curr_mx {
            outcome.counts.mx_changes += 1;
            outcome.events.push(ChangeEvent::MxChange {
                candidate: curr.clone(),
                previous_mx: prev.dns_mx.clone(),
                current_mx: curr.dns_mx.clone(),
            });
        }

        if !prev.geoip.is_empty() && !curr.geoip.is_empty() && prev.geoip != curr.geoip {
            outcome.counts.geoip_changes += 1;
            outcome.events.push(ChangeEvent::GeoipChange {
                candidate: curr.clone(),
                previous_geoip: prev.geoip.clone(),
                current_geoip: curr.geoip.clone(),
            });
        }
    }

    info!(
        seed,
        new = outcome.counts.new_registrations,
        became_active = outcome.counts.became_active,
        became_parked = outcome.counts.became_parked,
        ip_changes = outcome.counts.ip_changes,
        mx_changes = outcome.counts.mx_changes,
        removed = outcome.removed_domains.len(),
        "diff complete"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_core::model::RiskLevel;

    fn candidate(domain: &str, a: &[&str], mx: &[&str]) -> Candidate {
        let mut c = Candidate::new(domain, "homoglyph");
        c.dns_a = a.iter().map(|s| s.to_string()).collect();
        c.dns_mx = mx.iter().map(|s| s.to_string()).collect();
        c.recompute_registered();
        c
    }

    fn snapshot_of(candidates: Vec<Candidate>) -> Snapshot {
        let mut snapshot = Snapshot {
            last_scan: Some(Utc::now()),
            ..Default::default()
        };
        for c in candidates {
            snapshot.registered_domains.insert(c.domain.clone(), c);
        }
        snapshot.total_registered = snapshot.registered_domains.len();
        snapshot
    }

    fn map_of(candidates: Vec<Candidate>) -> BTreeMap<String, Candidate> {
        candidates
            .into_iter()
            .map(|c| (c.domain.clone(), c))
            .collect()
    }

    async fn diff_pure(
        previous: &Snapshot,
        current: &mut BTreeMap<String, Candidate>,
    ) -> DiffOutcome {
        diff_snapshots(previous, current, "acme.com", &[], Utc::now(), None).await
    }

    #[tokio::test]
    async fn test_first_scan_yields_only_new_registrations() {
        let previous = Snapshot::default();
        let mut current = map_of(vec![
            candidate("acme-loan.com", &["1.2.3.4"], &["mail.x"]),
            candidate("acmee.com", &["5.6.7.8"], &[]),
        ]);

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.counts.new_registrations, 2);
        assert_eq!(outcome.events.len(), 2);
        assert!(outcome
            .events
            .iter()
            .all(|e| e.kind() == "new_registration"));
    }

    #[tokio::test]
    async fn test_diff_is_deterministic_and_sorted() {
        let previous = Snapshot::default();
        let mut current_a = map_of(vec![
            candidate("zz-acme.com", &["1.1.1.1"], &[]),
            candidate("aa-acme.com", &["2.2.2.2"], &[]),
        ]);
        let mut current_b = current_a.clone();

        let first = diff_pure(&previous, &mut current_a).await;
        let second = diff_pure(&previous, &mut current_b).await;

        assert_eq!(first.events, second.events);
        assert_eq!(first.events[0].domain(), "aa-acme.com");
        assert_eq!(first.events[1].domain(), "zz-acme.com");
    }

    #[tokio::test]
    async fn test_parked_to_active_transition() {
        let mut prev_candidate = candidate("acme-login.com", &["1.2.3.4"], &[]);
        prev_candidate.parked = Some(true);
        let previous = snapshot_of(vec![prev_candidate]);

        let mut curr_candidate = candidate("acme-login.com", &["1.2.3.4"], &[]);
        curr_candidate.parked = Some(false);
        let mut current = map_of(vec![curr_candidate]);

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.counts.became_active, 1);
        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.events[0].is_high_priority());
    }

    #[tokio::test]
    async fn test_unknown_parking_never_transitions() {
        let mut prev_candidate = candidate("acmee.com", &["1.2.3.4"], &[]);
        prev_candidate.parked = None;
        let previous = snapshot_of(vec![prev_candidate]);

        let mut curr_candidate = candidate("acmee.com", &["1.2.3.4"], &[]);
        curr_candidate.parked = Some(false);
        let mut current = map_of(vec![curr_candidate]);

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.counts.became_active, 0);
        assert_eq!(outcome.counts.became_parked, 0);
    }

    #[tokio::test]
    async fn test_ip_change_reports_added_and_removed() {
        let previous = snapshot_of(vec![candidate("acmee.com", &["1.1.1.1", "2.2.2.2"], &[])]);
        let mut current = map_of(vec![candidate("acmee.com", &["2.2.2.2", "3.3.3.3"], &[])]);

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.counts.ip_changes, 1);
        match &outcome.events[0] {
            ChangeEvent::IpChange {
                added_ips,
                removed_ips,
                ..
            } => {
                assert_eq!(added_ips, &vec!["3.3.3.3".to_string()]);
                assert_eq!(removed_ips, &vec!["1.1.1.1".to_string()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mx_new_vs_mx_change() {
        let previous = snapshot_of(vec![
            candidate("no-mx.com", &["1.1.1.1"], &[]),
            candidate("has-mx.com", &["1.1.1.1"], &["mail.old"]),
        ]);
        let mut current = map_of(vec![
            candidate("no-mx.com", &["1.1.1.1"], &["mail.new"]),
            candidate("has-mx.com", &["1.1.1.1"], &["mail.changed"]),
        ]);

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.counts.mx_changes, 2);

        let kinds: Vec<&str> = outcome.events.iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&"mx_new"));
        assert!(kinds.contains(&"mx_change"));

        let mx_new = outcome
            .events
            .iter()
            .find(|e| e.kind() == "mx_new")
            .unwrap();
        assert!(mx_new.is_high_priority());
    }

    #[tokio::test]
    async fn test_removed_domains_tracked() {
        let previous = snapshot_of(vec![candidate("gone.com", &["1.1.1.1"], &[])]);
        let mut current = BTreeMap::new();

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.removed_domains, vec!["gone.com".to_string()]);
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn test_defensive_flag_inherited_by_events() {
        let previous = Snapshot::default();
        let mut c = candidate("acme-careers.com", &["1.2.3.4"], &["mail.x"]);
        c.set_risk(RiskLevel::Defensive);
        let mut current = map_of(vec![c]);

        let outcome = diff_pure(&previous, &mut current).await;
        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.events[0].is_defensive());
    }

    #[test]
    fn test_merge_previous_whois_fills_gaps() {
        let mut prev = candidate("acmee.com", &["1.1.1.1"], &[]);
        prev.registrar = Some("MarkMonitor Inc.".into());
        prev.whois_name_servers = vec!["ns1.markmonitor.com".into()];
        let previous = snapshot_of(vec![prev]);

        let mut current = map_of(vec![candidate("acmee.com", &["1.1.1.1"], &[])]);
        merge_previous_whois(&previous, &mut current);

        let merged = &current["acmee.com"];
        assert_eq!(merged.registrar.as_deref(), Some("MarkMonitor Inc."));
        assert_eq!(merged.whois_name_servers.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_domains_subject_set() {
        let mut prev_candidate = candidate("acme-login.com", &["1.2.3.4"], &[]);
        prev_candidate.parked = Some(true);
        let previous = snapshot_of(vec![prev_candidate]);

        let mut curr_parked = candidate("acme-login.com", &["1.2.3.4"], &[]);
        curr_parked.parked = Some(false);
        let mut current = map_of(vec![
            curr_parked,
            candidate("brand-new.com", &["9.9.9.9"], &[]),
        ]);

        let outcome = diff_pure(&previous, &mut current).await;
        let changed = outcome.changed_domains();
        assert!(changed.contains(&"acme-login.com".to_string()));
        assert!(changed.contains(&"brand-new.com".to_string()));
        assert_eq!(outcome.became_active_domains(), vec!["acme-login.com"]);
    }
}
