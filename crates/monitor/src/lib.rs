//! Watchtower Monitor
//!
//! The run-time core of the engine: snapshot state store, change diffing,
//! WHOIS change tracking, the enrichment fan-out, the per-run orchestrator,
//! report persistence, and the daily summary notification.

pub mod diff;
pub mod enrichment;
pub mod notify;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod whois;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use report::{DomainReport, ReportWriter, RunReport, RunTotals};
pub use state::StateStore;

/// Cooperative cancellation signal.
///
/// Checked between stages and between monitored domains; in-flight feed
/// calls drain at their own timeout boundary. Completed domains keep their
/// persisted snapshots, the report is marked cancelled, and no summary
/// notification is sent.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
