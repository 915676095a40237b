//! Enrichment pipeline
//!
//! Fans the candidate set out to the external threat-intel feeds under the
//! per-feed rate rules. Every stage is independent: a feed without
//! credentials reports `not configured`, a failing feed records its error,
//! and nothing here ever fails the run. Brand CT discovery is the one
//! ordered stage; domains it surfaces join the active set and participate
//! in the stages that follow.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use watchtower_core::config::base_label;
use watchtower_core::model::{Candidate, FeedReport};
use watchtower_core::risk::classify_and_mark;
use watchtower_core::MonitorConfig;
use watchtower_feeds::{ClientRegistry, FeedError};

use crate::diff::DiffOutcome;
use crate::report::{DomainReport, RfScanSection, VtDomainVerdict, VtScanSection};
use crate::whois::WhoisMonitor;
use crate::CancelFlag;

/// Default VirusTotal lookups per run.
pub const DEFAULT_VT_MAX_CHECKS: usize = 50;

/// Emails checked against HIBP per seed.
const HIBP_MAX_CHECKS: usize = 20;

/// Days of CT history checked for lookalikes.
const CT_LOOKALIKE_DAYS: i64 = 7;
/// Days of CT history checked for watchlist domains.
const CT_WATCHLIST_DAYS: i64 = 90;
/// Hours of CT history for the brand impersonation sweep.
const CT_BRAND_HOURS: i64 = 48;

pub struct EnrichmentPipeline<'a> {
    pub registry: &'a ClientRegistry,
    pub cancel: &'a CancelFlag,
    pub vt_max_checks: usize,
}

impl EnrichmentPipeline<'_> {
    /// Run every stage for one seed, writing feed sections into the report
    /// and enrichment fields into the candidates.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        seed: &str,
        config: &MonitorConfig,
        current: &mut BTreeMap<String, Candidate>,
        diff: &DiffOutcome,
        whois_monitor: &WhoisMonitor,
        seed_ips: &[String],
        report: &mut DomainReport,
    ) {
        let allowlist = config.defensive_allowlist(seed);

        // Subjects for the reputation stages: this run's new and
        // became-active candidates.
        let changed = diff.changed_domains();
        let mut active = diff.became_active_domains();

        if self.cancel.is_cancelled() {
            return;
        }

        self.stage_virustotal(&changed, current, report).await;
        self.stage_recorded_future(seed, config, current, report)
            .await;

        // Reputation data can move candidates up the risk ladder.
        for candidate in current.values_mut() {
            classify_and_mark(candidate, seed, &allowlist);
        }

        if self.cancel.is_cancelled() {
            return;
        }

        self.stage_watchlist(seed, config, &mut active, report).await;
        self.stage_brand_ct(seed, config, current, &mut active, report)
            .await;

        // Newly discovered impersonation candidates need a classification
        // before they show up in the snapshot.
        for candidate in current.values_mut() {
            classify_and_mark(candidate, seed, &allowlist);
        }

        if self.cancel.is_cancelled() {
            return;
        }

        // Remaining stages are independent of each other; fan out and join.
        let registry = self.registry;
        let abuseipdb_subjects: Vec<(String, Vec<String>)> = active
            .iter()
            .map(|d| {
                (
                    d.clone(),
                    current.get(d).map(|c| c.dns_a.clone()).unwrap_or_default(),
                )
            })
            .collect();

        let (dark_web, intelx, ct_logs, hibp, shodan, whois, abusech, abuseipdb) = tokio::join!(
            async { Some(FeedReport::ok(registry.leaks.search_all(seed).await)) },
            async {
                if !registry.intelx.is_configured() {
                    return Some(FeedReport::not_configured());
                }
                Some(FeedReport::from_result(
                    registry.intelx.search_domain(seed).await,
                ))
            },
            async {
                if changed.is_empty() {
                    return None;
                }
                info!(seed, count = changed.len(), "checking CT logs for lookalikes");
                Some(FeedReport::from_result(
                    registry
                        .ct
                        .check_lookalike_certs(&changed, CT_LOOKALIKE_DAYS)
                        .await,
                ))
            },
            async {
                if !registry.hibp.is_configured() {
                    return Some(FeedReport::not_configured());
                }
                Some(FeedReport::from_result(
                    registry.hibp.check_domain_emails(seed, HIBP_MAX_CHECKS).await,
                ))
            },
            async {
                if !registry.shodan.is_configured() {
                    return Some(FeedReport::not_configured());
                }
                Some(FeedReport::from_result(
                    registry.shodan.lookup_domain(seed, seed_ips).await,
                ))
            },
            async {
                if active.is_empty() {
                    return None;
                }
                info!(seed, count = active.len(), "checking WHOIS for active lookalikes");
                Some(FeedReport::ok(
                    whois_monitor.scan_domains(&registry.rdap, &active).await,
                ))
            },
            async {
                if active.is_empty() {
                    return None;
                }
                Some(FeedReport::from_result(
                    registry.abusech.bulk_check_domains(&active).await,
                ))
            },
            async {
                if abuseipdb_subjects.is_empty() {
                    return None;
                }
                if !registry.abuseipdb.is_configured() {
                    return Some(FeedReport::not_configured());
                }
                Some(FeedReport::from_result(
                    registry
                        .abuseipdb
                        .bulk_check_domains(&abuseipdb_subjects)
                        .await,
                ))
            },
        );

        report.dark_web = dark_web;
        report.intelx = intelx;
        report.ct_logs = ct_logs;
        report.hibp = hibp;
        report.shodan = shodan;
        report.whois = whois;
        report.abusech = abusech;
        report.abuseipdb = abuseipdb;
    }

    /// VT reputation for new and became-active candidates, capped per run
    /// and stopped early on a rate limit.
    async fn stage_virustotal(
        &self,
        subjects: &[String],
        current: &mut BTreeMap<String, Candidate>,
        report: &mut DomainReport,
    ) {
        if subjects.is_empty() {
            return;
        }
        if !self.registry.virustotal.is_configured() {
            report.virustotal = Some(FeedReport::not_configured());
            return;
        }

        let mut section = VtScanSection::default();
        for domain in subjects.iter().take(self.vt_max_checks) {
            match self.registry.virustotal.lookup_domain(domain).await {
                Ok(reputation) => {
                    section.domains_checked += 1;
                    if reputation.malicious >= 1 {
                        section.high_risk.push(VtDomainVerdict {
                            domain: domain.clone(),
                            threat_level: reputation.threat_level,
                            malicious: reputation.malicious,
                            suspicious: reputation.suspicious,
                        });
                    }
                    if let Some(candidate) = current.get_mut(domain) {
                        candidate.vt_reputation = Some(reputation);
                    }
                }
                Err(e) if e.stops_stage() => {
                    warn!(domain, "VT rate limit hit, stopping enrichment");
                    section.stopped_early = Some(e.to_string());
                    break;
                }
                Err(e) => debug!(domain, error = %e, "VT lookup failed"),
            }
        }

        report.virustotal = Some(FeedReport::ok(section));
    }

    /// Recorded Future enrichment for all registered candidates and their
    /// deduplicated A records, plus brand impersonation discovery.
    async fn stage_recorded_future(
        &self,
        seed: &str,
        config: &MonitorConfig,
        current: &mut BTreeMap<String, Candidate>,
        report: &mut DomainReport,
    ) {
        if current.is_empty() {
            return;
        }
        let rf = &self.registry.recorded_future;
        if !rf.is_configured() {
            report.recorded_future = Some(FeedReport::not_configured());
            return;
        }

        let mut section = RfScanSection::default();

        let domains: Vec<String> = current
            .values()
            .filter(|c| c.registered)
            .map(|c| c.domain.clone())
            .collect();
        match rf.enrich_domains(&domains).await {
            Ok(enriched) => {
                section.domains_enriched = enriched.len();
                for (domain, enrichment) in &enriched {
                    if enrichment.risk_score >= 65 {
                        section.high_risk_domains.push(domain.clone());
                    }
                    if let Some(candidate) = current.get_mut(domain) {
                        candidate.rf_risk_score = Some(enrichment.risk_score);
                        candidate.rf_risk_level = Some(enrichment.risk_level);
                        candidate.rf_rules = enrichment.rules.clone();
                    }
                }
                section.high_risk_domains.sort();
            }
            Err(e) => {
                warn!(seed, error = %e, "RF domain enrichment failed");
                report.recorded_future = Some(FeedReport::err(e.to_string()));
                return;
            }
        }

        let mut ips: Vec<String> = current
            .values()
            .flat_map(|c| c.dns_a.iter().cloned())
            .collect();
        ips.sort();
        ips.dedup();
        match rf.enrich_ips(&ips).await {
            Ok(enriched) => section.ips_enriched = enriched.len(),
            Err(e) => warn!(seed, error = %e, "RF IP enrichment failed"),
        }

        // Brand impersonation candidates the fuzzers cannot generate.
        let brand = base_label(seed);
        match rf
            .search_brand_domains(brand, &config.legitimate_domains(seed), 200)
            .await
        {
            Ok(impersonations) => {
                for imp in impersonations {
                    if current.contains_key(&imp.domain) {
                        continue;
                    }
                    let mut candidate = Candidate::new(&imp.domain, "rf-brand-impersonation");
                    candidate.registered = true;
                    candidate.rf_risk_score = Some(imp.rf_risk_score);
                    candidate.rf_risk_level = Some(imp.rf_risk_level);
                    candidate.rf_rules = imp.rf_rules;
                    current.insert(imp.domain, candidate);
                }
            }
            Err(FeedError::Status(404)) => {
                // Identity module absent on this subscription; not an error.
                debug!(seed, "RF brand search unavailable");
            }
            Err(e) => warn!(seed, error = %e, "RF brand search failed"),
        }

        report.recorded_future = Some(FeedReport::ok(section));
    }

    /// Semantic watchlist domains checked for certificates over a long
    /// window; hits join the active set for the remaining stages.
    async fn stage_watchlist(
        &self,
        seed: &str,
        config: &MonitorConfig,
        active: &mut Vec<String>,
        report: &mut DomainReport,
    ) {
        let watchlist = config.watchlist_for(seed);
        if watchlist.is_empty() {
            return;
        }

        info!(seed, count = watchlist.len(), "checking watchlist domains in CT logs");
        match self
            .registry
            .ct
            .check_lookalike_certs(&watchlist, CT_WATCHLIST_DAYS)
            .await
        {
            Ok(result) => {
                for hit in &result.high_risk_domains {
                    if !active.contains(&hit.domain) {
                        active.push(hit.domain.clone());
                    }
                }
                report.watchlist = Some(FeedReport::ok(result));
            }
            Err(e) => report.watchlist = Some(FeedReport::err(e.to_string())),
        }
    }

    /// Brand CT sweep; discovered domains become candidates with
    /// `fuzzer = ct-brand-impersonation` and feed the later stages.
    async fn stage_brand_ct(
        &self,
        seed: &str,
        config: &MonitorConfig,
        current: &mut BTreeMap<String, Candidate>,
        active: &mut Vec<String>,
        report: &mut DomainReport,
    ) {
        let brand = base_label(seed);
        let legitimate = config.legitimate_domains(seed);

        info!(seed, brand, "searching CT logs for brand impersonation");
        match self
            .registry
            .ct
            .discover_brand_impersonation(brand, &legitimate, CT_BRAND_HOURS)
            .await
        {
            Ok(result) => {
                for imp in &result.new_domains {
                    if !active.contains(&imp.domain) {
                        warn!(domain = %imp.domain, "CT logs discovered brand impersonation");
                        active.push(imp.domain.clone());
                    }
                    current.entry(imp.domain.clone()).or_insert_with(|| {
                        let mut candidate =
                            Candidate::new(&imp.domain, "ct-brand-impersonation");
                        candidate.registered = true;
                        candidate
                    });
                }
                report.brand_ct_search = Some(FeedReport::ok(result));
            }
            Err(e) => report.brand_ct_search = Some(FeedReport::err(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_core::Secrets;

    fn pipeline_parts() -> (ClientRegistry, CancelFlag) {
        (
            ClientRegistry::new(&Secrets::default()).unwrap(),
            CancelFlag::new(),
        )
    }

    #[tokio::test]
    async fn test_vt_stage_marks_not_configured_without_key() {
        let (registry, cancel) = pipeline_parts();
        let pipeline = EnrichmentPipeline {
            registry: &registry,
            cancel: &cancel,
            vt_max_checks: 4,
        };

        let mut current = BTreeMap::new();
        let mut report = DomainReport::default();
        pipeline
            .stage_virustotal(&["acmee.com".to_string()], &mut current, &mut report)
            .await;

        assert_eq!(report.virustotal, Some(FeedReport::not_configured()));
    }

    #[tokio::test]
    async fn test_vt_stage_omitted_without_subjects() {
        let (registry, cancel) = pipeline_parts();
        let pipeline = EnrichmentPipeline {
            registry: &registry,
            cancel: &cancel,
            vt_max_checks: 4,
        };

        let mut current = BTreeMap::new();
        let mut report = DomainReport::default();
        pipeline.stage_virustotal(&[], &mut current, &mut report).await;

        assert!(report.virustotal.is_none());
    }

    #[tokio::test]
    async fn test_rf_stage_marks_not_configured_without_key() {
        let (registry, cancel) = pipeline_parts();
        let pipeline = EnrichmentPipeline {
            registry: &registry,
            cancel: &cancel,
            vt_max_checks: 4,
        };

        let mut current = BTreeMap::new();
        current.insert(
            "acmee.com".to_string(),
            Candidate::new("acmee.com", "homoglyph"),
        );
        let mut report = DomainReport::default();
        pipeline
            .stage_recorded_future(
                "acme.com",
                &watchtower_core::MonitorConfig::default(),
                &mut current,
                &mut report,
            )
            .await;

        assert_eq!(report.recorded_future, Some(FeedReport::not_configured()));
    }
}
