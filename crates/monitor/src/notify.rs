//! Daily summary notification
//!
//! One message per run, rendered as markdown grouping counts by monitored
//! domain and highlighting became-active transitions and dark-web findings.
//! The transport is behind a trait; the shipped implementation posts to a
//! Webex room. No per-finding notifications are ever sent.

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::info;

use watchtower_core::model::FeedReport;

use crate::report::RunReport;

const WEBEX_MESSAGES_URL: &str = "https://webexapis.com/v1/messages";

/// Sink for the daily summary. The renderer and transport are opaque to
/// the orchestrator; it hands over the report and a destination id.
#[allow(async_fn_in_trait)]
pub trait SummaryNotifier {
    fn is_configured(&self) -> bool;
    async fn send_summary(&self, report: &RunReport, destination: &str) -> Result<()>;
}

/// Render the run report as a markdown summary.
pub fn render_summary(report: &RunReport) -> String {
    let totals = &report.totals;

    let critical = totals.total_became_active + totals.total_brand_impersonation;
    let warnings = totals.total_new_lookalikes
        + totals.total_dark_web_findings
        + totals.total_intelx_findings
        + totals.total_hibp_breaches;
    let health = if critical > 0 {
        "🔴 CRITICAL FINDINGS"
    } else if warnings > 0 {
        "🟡 WARNINGS DETECTED"
    } else {
        "🟢 ALL CLEAR"
    };

    let mut lines = vec![
        "## 📊 Daily Domain Monitoring Summary".to_string(),
        format!("**{health}**"),
        String::new(),
        format!(
            "**{}** new lookalikes | **{}** became active | **{}** MX changes | **{}** dark web | **{}** breached emails",
            totals.total_new_lookalikes,
            totals.total_became_active,
            totals.total_mx_changes,
            totals.total_dark_web_findings + totals.total_intelx_findings,
            totals.total_hibp_breaches,
        ),
        String::new(),
    ];

    for (seed, domain_report) in &report.domains {
        lines.push(format!("### 🌐 {seed}"));

        if let Some(FeedReport {
            data: Some(scan), ..
        }) = &domain_report.lookalikes
        {
            let line = if scan.counts.became_active > 0 {
                format!(
                    "- 🔴 Lookalikes: {} registered, {} new, {} BECAME ACTIVE",
                    scan.total_registered,
                    scan.counts.new_registrations,
                    scan.counts.became_active
                )
            } else if scan.counts.new_registrations > 0 {
                format!(
                    "- 🟡 Lookalikes: {} registered, {} new",
                    scan.total_registered, scan.counts.new_registrations
                )
            } else {
                format!("- ✅ Lookalikes: {} registered", scan.total_registered)
            };
            lines.push(line);
        }

        if let Some(FeedReport {
            data: Some(intelx), ..
        }) = &domain_report.intelx
        {
            if !intelx.darkweb_findings.is_empty() {
                lines.push(format!(
                    "- 🌑 Dark web: {} Tor/I2P mentions, {} leaks",
                    intelx.darkweb_findings.len(),
                    intelx.leak_findings.len()
                ));
            } else if !intelx.leak_findings.is_empty() {
                lines.push(format!(
                    "- ⚠️ Dark web: {} leak mentions",
                    intelx.leak_findings.len()
                ));
            } else {
                lines.push("- ✅ Dark web: no findings".to_string());
            }
        }

        if let Some(FeedReport {
            data: Some(dark_web),
            ..
        }) = &domain_report.dark_web
        {
            if dark_web.total_findings > 0 {
                lines.push(format!(
                    "- ⚠️ Data leaks: {} findings, {} high-risk",
                    dark_web.total_findings,
                    dark_web.high_risk_findings.len()
                ));
            }
        }

        if let Some(FeedReport {
            data: Some(ct), ..
        }) = &domain_report.ct_logs
        {
            if !ct.high_risk_domains.is_empty() {
                lines.push(format!(
                    "- 🔐 SSL certs: {} lookalikes with new certificates",
                    ct.high_risk_domains.len()
                ));
            }
        }

        if let Some(FeedReport {
            data: Some(hibp), ..
        }) = &domain_report.hibp
        {
            if hibp.emails_breached > 0 {
                lines.push(format!(
                    "- 🔓 Credentials: {} breached emails",
                    hibp.emails_breached
                ));
            }
        }

        lines.push(String::new());
    }

    lines.join("\n")
}

/// Posts the summary as a markdown message to a Webex room.
pub struct WebexNotifier {
    token: Option<String>,
    http: reqwest::Client,
}

impl WebexNotifier {
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self {
            token,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
        })
    }
}

impl SummaryNotifier for WebexNotifier {
    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn send_summary(&self, report: &RunReport, destination: &str) -> Result<()> {
        let Some(token) = &self.token else {
            bail!("notification token not configured");
        };

        let markdown = render_summary(report);
        let response = self
            .http
            .post(WEBEX_MESSAGES_URL)
            .bearer_auth(token)
            .json(&json!({
                "roomId": destination,
                "markdown": markdown,
            }))
            .send()
            .await
            .context("failed to send summary notification")?;

        if !response.status().is_success() {
            bail!("notification send failed: HTTP {}", response.status());
        }

        info!(destination, "daily summary sent");
        Ok(())
    }
}

/// Swallows summaries; used when no notification channel is configured
/// and in tests.
#[derive(Default)]
pub struct NullNotifier;

impl SummaryNotifier for NullNotifier {
    fn is_configured(&self) -> bool {
        false
    }

    async fn send_summary(&self, _report: &RunReport, _destination: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DomainReport, LookalikeScanSection};
    use chrono::Utc;

    #[test]
    fn test_all_clear_summary() {
        let report = RunReport::new(Utc::now());
        let summary = render_summary(&report);
        assert!(summary.contains("ALL CLEAR"));
    }

    #[test]
    fn test_became_active_is_critical() {
        let mut report = RunReport::new(Utc::now());
        let mut scan = LookalikeScanSection::default();
        scan.total_registered = 12;
        scan.counts.became_active = 1;
        report.accumulate(
            "acme.com",
            DomainReport {
                lookalikes: Some(FeedReport::ok(scan)),
                ..Default::default()
            },
        );

        let summary = render_summary(&report);
        assert!(summary.contains("CRITICAL FINDINGS"));
        assert!(summary.contains("BECAME ACTIVE"));
        assert!(summary.contains("acme.com"));
    }

    #[test]
    fn test_new_lookalikes_are_warnings() {
        let mut report = RunReport::new(Utc::now());
        let mut scan = LookalikeScanSection::default();
        scan.counts.new_registrations = 3;
        report.accumulate(
            "acme.com",
            DomainReport {
                lookalikes: Some(FeedReport::ok(scan)),
                ..Default::default()
            },
        );

        let summary = render_summary(&report);
        assert!(summary.contains("WARNINGS DETECTED"));
        assert!(summary.contains("3 new"));
    }
}
