//! Watchtower Feed Adapters
//!
//! One adapter per upstream threat-intelligence source. Every adapter owns
//! its own HTTP client, base URL, and credentials; the rest of the engine
//! never builds raw requests. Adapters expose `is_configured()` plus typed
//! lookups returning `Result<_, FeedError>`; the enrichment pipeline turns
//! those into per-feed report sections.

pub mod abusech;
pub mod abuseipdb;
pub mod crtsh;
pub mod hibp;
pub mod intelx;
pub mod leaks;
pub mod rdap;
pub mod recorded_future;
pub mod registry;
pub mod shodan;
pub mod urlscan;
pub mod virustotal;

use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub use registry::ClientRegistry;

/// User agent sent to every upstream.
pub const USER_AGENT: &str = "watchtower-domain-monitoring/0.1";

/// Default per-call timeout for feed requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error taxonomy shared by all feed adapters.
///
/// Rate-limit and credit errors are distinguished so the pipeline can stop a
/// stage early while keeping partial results; everything else is recorded in
/// the report and never raised past the stage boundary.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("not configured")]
    NotConfigured,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("query credits exhausted")]
    CreditsExhausted,
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Http(String),
    #[error("unexpected payload: {0}")]
    Parse(String),
}

impl FeedError {
    /// Errors that should stop the remaining calls of a stage for this run.
    pub fn stops_stage(&self) -> bool {
        matches!(self, FeedError::RateLimited | FeedError::CreditsExhausted)
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout
        } else if e.is_decode() {
            FeedError::Parse(e.to_string())
        } else {
            FeedError::Http(e.to_string())
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Build the HTTP client an adapter owns.
pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Enforces a minimum interval between consecutive calls to an upstream.
///
/// Used for HIBP (>= 6.1 s between requests, hard) and VirusTotal
/// (free tier: 4 requests per minute).
pub struct Pacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Sleep until the minimum interval since the previous call has passed.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pacer_enforces_minimum_interval() {
        let pacer = Pacer::new(Duration::from_millis(6100));

        let start = Instant::now();
        pacer.wait().await;
        // First call goes through immediately.
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(6100));

        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(12200));
    }

    #[test]
    fn test_stage_stopping_errors() {
        assert!(FeedError::RateLimited.stops_stage());
        assert!(FeedError::CreditsExhausted.stops_stage());
        assert!(!FeedError::Timeout.stops_stage());
        assert!(!FeedError::Status(500).stops_stage());
    }
}
