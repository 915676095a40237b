//! Daily monitoring orchestrator
//!
//! One pass over the monitored domains, strictly sequential per seed:
//! generate -> resolve -> classify parking -> classify risk -> diff, then
//! the enrichment fan-out, then the snapshot write. Snapshots are persisted
//! after enrichment so a failed re-run never loses classification context.
//! After all seeds: one report on disk, one summary notification.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use watchtower_core::model::{Candidate, FeedReport, RiskCounts, Snapshot};
use watchtower_core::risk::classify_and_mark;
use watchtower_core::MonitorConfig;
use watchtower_feeds::ClientRegistry;
use watchtower_lookalike::resolver::CandidateResolver;
use watchtower_lookalike::{
    GeneratorOptions, LookalikeGenerator, ParkingClassifier, DEFAULT_PARKING_WORKERS,
};

use crate::diff::{self, DiffOutcome};
use crate::enrichment::{EnrichmentPipeline, DEFAULT_VT_MAX_CHECKS};
use crate::notify::SummaryNotifier;
use crate::report::{DomainReport, LookalikeScanSection, ReportWriter, RunReport};
use crate::state::{RunLock, StateStore};
use crate::whois::WhoisMonitor;
use crate::CancelFlag;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub check_parking: bool,
    pub parking_workers: usize,
    pub registered_only: bool,
    pub include_malicious_tlds: bool,
    pub vt_max_checks: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            check_parking: true,
            parking_workers: DEFAULT_PARKING_WORKERS,
            registered_only: true,
            include_malicious_tlds: true,
            vt_max_checks: DEFAULT_VT_MAX_CHECKS,
        }
    }
}

pub struct Orchestrator<N: SummaryNotifier> {
    config: MonitorConfig,
    registry: ClientRegistry,
    generator: LookalikeGenerator,
    parking: ParkingClassifier,
    resolver: CandidateResolver,
    state: StateStore,
    whois_monitor: WhoisMonitor,
    reports: ReportWriter,
    notifier: N,
    destination: Option<String>,
    cancel: CancelFlag,
    options: OrchestratorOptions,
}

impl<N: SummaryNotifier> Orchestrator<N> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MonitorConfig,
        registry: ClientRegistry,
        state: StateStore,
        whois_monitor: WhoisMonitor,
        reports: ReportWriter,
        notifier: N,
        destination: Option<String>,
        options: OrchestratorOptions,
    ) -> Result<Self> {
        let parking = ParkingClassifier::new(Some(registry.urlscan.clone()))?;
        Ok(Self {
            generator: LookalikeGenerator::new()?,
            resolver: CandidateResolver::new()?,
            parking,
            config,
            registry,
            state,
            whois_monitor,
            reports,
            notifier,
            destination,
            cancel: CancelFlag::new(),
            options,
        })
    }

    /// Handle for wiring external cancellation (ctrl-c, scheduler stop).
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run one full monitoring pass.
    pub async fn run(&self) -> Result<RunReport> {
        let _lock = RunLock::acquire(self.state.dir())?;

        if self.config.monitored_domains.is_empty() {
            warn!("no domains configured for monitoring");
        }
        info!(
            domains = self.config.monitored_domains.len(),
            "starting domain monitoring pass"
        );

        let scan_time = Utc::now();
        let mut run_report = RunReport::new(scan_time);

        for seed in &self.config.monitored_domains {
            if self.cancel.is_cancelled() {
                warn!(seed, "run cancelled, skipping remaining domains");
                break;
            }
            info!(seed, "monitoring domain");
            let domain_report = self.scan_seed(seed, scan_time).await;
            run_report.accumulate(seed, domain_report);
        }

        run_report.cancelled = self.cancel.is_cancelled();

        info!(
            new_lookalikes = run_report.totals.total_new_lookalikes,
            became_active = run_report.totals.total_became_active,
            mx_changes = run_report.totals.total_mx_changes,
            dark_web = run_report.totals.total_dark_web_findings,
            intelx = run_report.totals.total_intelx_findings,
            ct = run_report.totals.total_ct_findings,
            whois_changes = run_report.totals.total_whois_changes,
            cancelled = run_report.cancelled,
            "monitoring pass complete"
        );

        self.reports.write(&run_report)?;

        if run_report.cancelled {
            info!("cancelled run, summary notification suppressed");
        } else if let Some(destination) = &self.destination {
            if self.notifier.is_configured() {
                if let Err(e) = self.notifier.send_summary(&run_report, destination).await {
                    error!(error = %e, "failed to send summary notification");
                }
            } else {
                info!("notifier not configured, skipping summary");
            }
        }

        Ok(run_report)
    }

    /// Full pipeline for one monitored domain. Never fails the run; every
    /// failure lands in the report instead.
    async fn scan_seed(&self, seed: &str, scan_time: DateTime<Utc>) -> DomainReport {
        let mut report = DomainReport::default();
        let previous = self.state.load(seed);
        let allowlist = self.config.defensive_allowlist(seed);

        let generated = self
            .generator
            .generate(
                seed,
                &GeneratorOptions {
                    registered_only: self.options.registered_only,
                    include_malicious_tlds: self.options.include_malicious_tlds,
                    resolve_dns: true,
                    ..Default::default()
                },
            )
            .await;

        let mut current: BTreeMap<String, Candidate> = BTreeMap::new();
        let mut diff_outcome = DiffOutcome::default();
        let mut scanned = false;

        match generated {
            Ok(mut candidates) => {
                scanned = true;

                if self.options.check_parking {
                    self.parking
                        .classify_batch(&mut candidates, self.options.parking_workers)
                        .await;
                }

                current = candidates
                    .into_iter()
                    .filter(|c| c.registered)
                    .map(|c| (c.domain.clone(), c))
                    .collect();

                diff::merge_previous_whois(&previous, &mut current);
                diff::backfill_missing_whois(&self.registry.rdap, &previous, &mut current).await;

                for candidate in current.values_mut() {
                    classify_and_mark(candidate, seed, &allowlist);
                }

                diff_outcome = diff::diff_snapshots(
                    &previous,
                    &mut current,
                    seed,
                    &allowlist,
                    scan_time,
                    Some(&self.registry.rdap),
                )
                .await;
            }
            Err(e) => {
                error!(seed, error = %e, "lookalike scan failed");
                report.lookalikes = Some(FeedReport::err(e.to_string()));
            }
        }

        // Seed infrastructure IPs for the Shodan stage.
        let seed_ips = self.resolver.resolve_a(seed).await;

        let pipeline = EnrichmentPipeline {
            registry: &self.registry,
            cancel: &self.cancel,
            vt_max_checks: self.options.vt_max_checks,
        };
        pipeline
            .run(
                seed,
                &self.config,
                &mut current,
                &diff_outcome,
                &self.whois_monitor,
                &seed_ips,
                &mut report,
            )
            .await;

        if scanned {
            let risk_counts = RiskCounts::tally(current.values());
            let new_actionable_count = diff_outcome
                .events
                .iter()
                .filter(|e| e.kind() == "new_registration" && !e.is_defensive())
                .count();
            let became_active_actionable_count = diff_outcome
                .events
                .iter()
                .filter(|e| e.kind() == "became_active" && !e.is_defensive())
                .count();

            info!(
                seed,
                registered = current.len(),
                defensive = risk_counts.defensive,
                high_risk = risk_counts.high_risk,
                new = diff_outcome.counts.new_registrations,
                actionable_new = new_actionable_count,
                became_active = diff_outcome.counts.became_active,
                "scan complete"
            );

            report.lookalikes = Some(FeedReport::ok(LookalikeScanSection {
                scan_time,
                is_first_scan: previous.is_first_scan(),
                total_registered: current.len(),
                actionable_count: risk_counts.actionable(),
                risk_counts,
                counts: diff_outcome.counts,
                new_actionable_count,
                became_active_actionable_count,
                removed_count: diff_outcome.removed_domains.len(),
                removed_domains: diff_outcome.removed_domains.clone(),
                changes: diff_outcome.events.clone(),
            }));

            // Snapshot write happens after enrichment so a failed re-run
            // never loses classification context.
            let snapshot = Snapshot {
                last_scan: Some(scan_time),
                total_registered: current.len(),
                risk_counts,
                registered_domains: current,
            };
            if let Err(e) = self.state.save(seed, &snapshot) {
                error!(seed, error = %e, "failed to persist snapshot");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use watchtower_core::Secrets;

    fn orchestrator_in(
        dir: &std::path::Path,
        config: MonitorConfig,
    ) -> Orchestrator<NullNotifier> {
        let registry = ClientRegistry::new(&Secrets::default()).unwrap();
        Orchestrator::new(
            config,
            registry,
            StateStore::new(dir.join("state")).unwrap(),
            WhoisMonitor::new(dir.join("whois_state")).unwrap(),
            ReportWriter::new(dir.join("reports")).unwrap(),
            NullNotifier,
            None,
            OrchestratorOptions::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_config_produces_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_in(dir.path(), MonitorConfig::default());

        let report = orchestrator.run().await.unwrap();
        assert!(report.totals.is_all_zero());
        assert!(!report.cancelled);
        assert!(report.domains.is_empty());
        assert!(dir.path().join("reports/latest.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_marked_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig {
            monitored_domains: vec!["acme.com".into()],
            ..Default::default()
        };
        let orchestrator = orchestrator_in(dir.path(), config);

        orchestrator.cancel_flag().cancel();
        let report = orchestrator.run().await.unwrap();

        assert!(report.cancelled);
        // Cancellation before the first domain means no per-domain work.
        assert!(report.domains.is_empty());
        assert!(dir.path().join("reports/latest.json").exists());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_in(dir.path(), MonitorConfig::default());

        let _lock = RunLock::acquire(orchestrator.state.dir()).unwrap();
        assert!(orchestrator.run().await.is_err());
    }
}
