//! Watchtower Core
//!
//! Shared foundation for the domain-abuse monitoring engine:
//! - Data model (candidates, snapshots, change events, feed results)
//! - Monitoring configuration (monitored domains, allowlists, watchlists)
//! - Secret / endpoint registry for upstream feeds
//! - Risk classification for lookalike candidates

pub mod config;
pub mod model;
pub mod risk;
pub mod secrets;

pub use config::MonitorConfig;
pub use model::{
    Candidate, ChangeEvent, Confidence, FeedReport, RfRiskLevel, RiskCounts, RiskLevel, Snapshot,
    VtReputation, VtThreatLevel, WhoisFieldChange, WhoisSeverity,
};
pub use risk::classify_candidate;
pub use secrets::Secrets;
