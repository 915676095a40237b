//! Watchtower daily monitoring CLI
//!
//! Invoked once per day by an external scheduler. Exit code 0 on a
//! completed run, including runs where every feed failed; non-zero only for
//! unreadable configuration, an unwritable state/report location, or an
//! active concurrent run.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use watchtower_core::{MonitorConfig, Secrets};
use watchtower_feeds::ClientRegistry;
use watchtower_monitor::notify::WebexNotifier;
use watchtower_monitor::whois::WhoisMonitor;
use watchtower_monitor::{Orchestrator, OrchestratorOptions, ReportWriter, StateStore};

#[derive(Parser, Debug)]
#[command(name = "watchtower", about = "Daily lookalike-domain monitoring")]
struct Args {
    /// Monitoring configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for per-domain scan snapshots.
    #[arg(long, default_value = "state")]
    state_dir: PathBuf,

    /// Directory for per-candidate WHOIS history.
    #[arg(long, default_value = "whois_state")]
    whois_state_dir: PathBuf,

    /// Directory for dated run reports.
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Notification room id; overrides WEBEX_ROOM_ID.
    #[arg(long)]
    room: Option<String>,

    /// Skip the parking-status cascade.
    #[arg(long)]
    no_parking_check: bool,

    /// Include every generated candidate, not just registered ones.
    #[arg(long)]
    all_candidates: bool,

    /// VirusTotal lookups allowed per run.
    #[arg(long, default_value_t = 50)]
    vt_max_checks: usize,

    /// Parking-check worker count.
    #[arg(long, default_value_t = 10)]
    parking_workers: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "monitoring run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting Watchtower");

    // Missing or malformed configuration is the one fatal input error.
    let config = MonitorConfig::from_file(&args.config)?;
    if config.monitored_domains.is_empty() {
        warn!(config = %args.config.display(), "no monitored domains configured");
    }

    let secrets = Secrets::from_env();
    let destination = args.room.clone().or_else(|| secrets.webex_room_id.clone());
    let notifier = WebexNotifier::new(secrets.webex_bot_token.clone())?;
    let registry = ClientRegistry::new(&secrets)?;

    let orchestrator = Orchestrator::new(
        config,
        registry,
        StateStore::new(&args.state_dir)?,
        WhoisMonitor::new(&args.whois_state_dir)?,
        ReportWriter::new(&args.reports_dir)?,
        notifier,
        destination,
        OrchestratorOptions {
            check_parking: !args.no_parking_check,
            parking_workers: args.parking_workers,
            registered_only: !args.all_candidates,
            include_malicious_tlds: true,
            vt_max_checks: args.vt_max_checks,
        },
    )?;

    // Ctrl-c requests a graceful stop: finish nothing new, persist what
    // completed, skip the summary.
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, stopping after current stage");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await?;
    info!(
        cancelled = report.cancelled,
        domains = report.domains.len(),
        "run finished"
    );
    Ok(())
}
