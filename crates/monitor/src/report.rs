//! Run report model and writer
//!
//! The per-run JSON artifact is the stable contract for the dashboard:
//! top-level totals plus a per-domain map of feed sections. The writer
//! persists a dated copy and atomically refreshes the `latest.json`
//! pointer.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use watchtower_core::model::{ChangeEvent, FeedReport, RiskCounts, VtThreatLevel};
use watchtower_feeds::abusech::AbusechBulkResult;
use watchtower_feeds::abuseipdb::AbuseIpDbBulkResult;
use watchtower_feeds::crtsh::{BrandImpersonationResult, CtLookalikeResult};
use watchtower_feeds::hibp::HibpDomainResult;
use watchtower_feeds::intelx::IntelxFindings;
use watchtower_feeds::leaks::LeakFindings;
use watchtower_feeds::shodan::ShodanInfra;

use crate::diff::ChangeCounts;
use crate::whois::WhoisScanResult;

/// Lookalike scan summary for one seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LookalikeScanSection {
    pub scan_time: DateTime<Utc>,
    pub is_first_scan: bool,
    pub total_registered: usize,
    pub risk_counts: RiskCounts,
    pub actionable_count: usize,
    pub counts: ChangeCounts,
    /// New or became-active candidates that are not defensive.
    pub new_actionable_count: usize,
    pub became_active_actionable_count: usize,
    pub removed_count: usize,
    pub removed_domains: Vec<String>,
    pub changes: Vec<ChangeEvent>,
}

/// One domain's VirusTotal verdict in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VtDomainVerdict {
    pub domain: String,
    pub threat_level: VtThreatLevel,
    pub malicious: u32,
    pub suspicious: u32,
}

/// VirusTotal stage summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VtScanSection {
    pub domains_checked: usize,
    pub high_risk: Vec<VtDomainVerdict>,
    /// Set when the stage stopped early on a rate limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_early: Option<String>,
}

/// Recorded Future stage summary; per-candidate scores live on the
/// candidates themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RfScanSection {
    pub domains_enriched: usize,
    pub ips_enriched: usize,
    pub high_risk_domains: Vec<String>,
}

/// All feed sections for one monitored domain. Stages that never ran for
/// this seed (no subjects) are omitted from the JSON entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DomainReport {
    pub lookalikes: Option<FeedReport<LookalikeScanSection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dark_web: Option<FeedReport<LeakFindings>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelx: Option<FeedReport<IntelxFindings>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct_logs: Option<FeedReport<CtLookalikeResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchlist: Option<FeedReport<CtLookalikeResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_ct_search: Option<FeedReport<BrandImpersonationResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois: Option<FeedReport<WhoisScanResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virustotal: Option<FeedReport<VtScanSection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_future: Option<FeedReport<RfScanSection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hibp: Option<FeedReport<HibpDomainResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shodan: Option<FeedReport<ShodanInfra>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abusech: Option<FeedReport<AbusechBulkResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abuseipdb: Option<FeedReport<AbuseIpDbBulkResult>>,
}

/// Top-level counters across all monitored domains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunTotals {
    pub total_new_lookalikes: usize,
    pub total_became_active: usize,
    pub total_mx_changes: usize,
    pub total_dark_web_findings: usize,
    pub total_intelx_findings: usize,
    pub total_ct_findings: usize,
    pub total_watchlist_with_certs: usize,
    pub total_brand_impersonation: usize,
    pub total_whois_changes: usize,
    pub total_vt_high_risk: usize,
    pub total_hibp_breaches: usize,
    pub total_shodan_exposures: usize,
    pub total_abusech_malicious: usize,
    pub total_abuseipdb_malicious: usize,
}

impl RunTotals {
    pub fn is_all_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// The per-run aggregate artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunReport {
    #[serde(default)]
    pub scan_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled: bool,
    pub domains: BTreeMap<String, DomainReport>,
    #[serde(flatten)]
    pub totals: RunTotals,
}

impl RunReport {
    pub fn new(scan_time: DateTime<Utc>) -> Self {
        Self {
            scan_time: Some(scan_time),
            ..Default::default()
        }
    }

    /// Fold one domain's sections into the run totals.
    pub fn accumulate(&mut self, seed: &str, report: DomainReport) {
        let totals = &mut self.totals;

        if let Some(FeedReport {
            data: Some(scan), ..
        }) = &report.lookalikes
        {
            totals.total_new_lookalikes += scan.counts.new_registrations;
            totals.total_became_active += scan.counts.became_active;
            totals.total_mx_changes += scan.counts.mx_changes;
        }
        if let Some(FeedReport {
            data: Some(dark_web),
            ..
        }) = &report.dark_web
        {
            totals.total_dark_web_findings += dark_web.total_findings;
        }
        if let Some(FeedReport {
            data: Some(intelx), ..
        }) = &report.intelx
        {
            totals.total_intelx_findings += intelx.total_findings;
        }
        if let Some(FeedReport {
            data: Some(ct), ..
        }) = &report.ct_logs
        {
            totals.total_ct_findings += ct.high_risk_domains.len();
        }
        if let Some(FeedReport {
            data: Some(watchlist),
            ..
        }) = &report.watchlist
        {
            totals.total_watchlist_with_certs += watchlist.domains_with_certs;
        }
        if let Some(FeedReport {
            data: Some(brand), ..
        }) = &report.brand_ct_search
        {
            totals.total_brand_impersonation += brand.new_domains.len();
        }
        if let Some(FeedReport {
            data: Some(whois), ..
        }) = &report.whois
        {
            totals.total_whois_changes += whois.domains_with_changes;
        }
        if let Some(FeedReport {
            data: Some(vt), ..
        }) = &report.virustotal
        {
            totals.total_vt_high_risk += vt.high_risk.len();
        }
        if let Some(FeedReport {
            data: Some(hibp), ..
        }) = &report.hibp
        {
            totals.total_hibp_breaches += hibp.emails_breached;
        }
        if let Some(FeedReport {
            data: Some(shodan), ..
        }) = &report.shodan
        {
            totals.total_shodan_exposures += shodan.exposed_services.len();
        }
        if let Some(FeedReport {
            data: Some(abusech),
            ..
        }) = &report.abusech
        {
            totals.total_abusech_malicious += abusech.malicious_domains.len();
        }
        if let Some(FeedReport {
            data: Some(abuseipdb),
            ..
        }) = &report.abuseipdb
        {
            totals.total_abuseipdb_malicious += abuseipdb.domains_with_malicious_ips.len();
        }

        self.domains.insert(seed.to_string(), report);
    }
}

/// Persists run reports: `reports/<YYYY-MM-DD>/results.json` plus an
/// atomically refreshed `reports/latest.json`.
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create reports directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn write(&self, report: &RunReport) -> Result<PathBuf> {
        let date = report
            .scan_time
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d")
            .to_string();
        let date_dir = self.dir.join(&date);
        fs::create_dir_all(&date_dir)
            .with_context(|| format!("failed to create report directory {}", date_dir.display()))?;

        let content = serde_json::to_string_pretty(report)?;
        let dated = date_dir.join("results.json");
        write_atomic(&dated, &content)?;
        write_atomic(&self.dir.join("latest.json"), &content)?;

        info!(path = %dated.display(), "run report saved");
        Ok(dated)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .with_context(|| format!("failed to write report temp file {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace report file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate_across_domains() {
        let mut run = RunReport::new(Utc::now());

        let mut scan = LookalikeScanSection::default();
        scan.counts.new_registrations = 2;
        scan.counts.became_active = 1;
        run.accumulate(
            "acme.com",
            DomainReport {
                lookalikes: Some(FeedReport::ok(scan)),
                ..Default::default()
            },
        );

        let mut scan = LookalikeScanSection::default();
        scan.counts.new_registrations = 3;
        run.accumulate(
            "globex.com",
            DomainReport {
                lookalikes: Some(FeedReport::ok(scan)),
                ..Default::default()
            },
        );

        assert_eq!(run.totals.total_new_lookalikes, 5);
        assert_eq!(run.totals.total_became_active, 1);
        assert_eq!(run.domains.len(), 2);
    }

    #[test]
    fn test_failed_sections_do_not_count() {
        let mut run = RunReport::new(Utc::now());
        run.accumulate(
            "acme.com",
            DomainReport {
                lookalikes: Some(FeedReport::err("generation failed")),
                hibp: Some(FeedReport::not_configured()),
                ..Default::default()
            },
        );
        assert!(run.totals.is_all_zero());
    }

    #[test]
    fn test_report_json_shape() {
        let mut run = RunReport::new(Utc::now());
        run.accumulate(
            "acme.com",
            DomainReport {
                lookalikes: Some(FeedReport::ok(LookalikeScanSection::default())),
                hibp: Some(FeedReport::not_configured()),
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["total_new_lookalikes"], 0);
        assert_eq!(json["domains"]["acme.com"]["hibp"]["success"], false);
        assert_eq!(
            json["domains"]["acme.com"]["hibp"]["error"],
            "not configured"
        );
        // Sections that never ran are absent from the JSON.
        assert!(json["domains"]["acme.com"].get("shodan").is_none());
    }

    #[test]
    fn test_writer_produces_dated_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();

        let report = RunReport::new(Utc::now());
        let dated = writer.write(&report).unwrap();

        assert!(dated.exists());
        assert!(dir.path().join("latest.json").exists());

        let loaded: RunReport =
            serde_json::from_str(&fs::read_to_string(dir.path().join("latest.json")).unwrap())
                .unwrap();
        assert_eq!(loaded, report);
    }
}
