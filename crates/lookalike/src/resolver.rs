//! Candidate DNS resolution
//!
//! Resolves A/AAAA/MX/NS records for generated candidates with bounded
//! concurrency. A candidate counts as registered when any of A/AAAA/MX
//! resolves; NXDOMAIN and lookup failures simply leave the record lists
//! empty.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::{debug, info};

use watchtower_core::model::Candidate;

/// Default worker count for batch resolution.
pub const DEFAULT_RESOLVE_WORKERS: usize = 10;

pub struct CandidateResolver {
    inner: TokioAsyncResolver,
}

impl CandidateResolver {
    pub fn new() -> Result<Self> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts);
        Ok(Self { inner: resolver })
    }

    /// Fill in a candidate's DNS fields and its `registered` flag.
    pub async fn resolve_candidate(&self, candidate: &mut Candidate) {
        let domain = candidate.domain.clone();
        debug!(domain, "resolving candidate");

        if let Ok(lookup) = self.inner.ipv4_lookup(domain.as_str()).await {
            candidate.dns_a = lookup.iter().map(|ip| ip.to_string()).collect();
        }
        if let Ok(lookup) = self.inner.ipv6_lookup(domain.as_str()).await {
            candidate.dns_aaaa = lookup.iter().map(|ip| ip.to_string()).collect();
        }
        if let Ok(lookup) = self.inner.mx_lookup(domain.as_str()).await {
            candidate.dns_mx = lookup
                .iter()
                .map(|mx| normalize_name(&mx.exchange().to_string()))
                .collect();
        }
        if let Ok(lookup) = self.inner.ns_lookup(domain.as_str()).await {
            candidate.dns_ns = lookup
                .iter()
                .map(|ns| normalize_name(&ns.to_string()))
                .collect();
        }

        candidate.dns_a.sort();
        candidate.dns_mx.sort();
        candidate.dns_ns.sort();
        candidate.recompute_registered();
    }

    /// Resolve a batch of candidates with a bounded worker pool.
    pub async fn resolve_batch(&self, candidates: &mut [Candidate], workers: usize) {
        let total = candidates.len();
        info!(total, workers, "resolving candidate batch");

        stream::iter(candidates.iter_mut())
            .for_each_concurrent(workers.max(1), |candidate| async move {
                self.resolve_candidate(candidate).await;
            })
            .await;

        let registered = candidates.iter().filter(|c| c.registered).count();
        info!(total, registered, "candidate resolution complete");
    }

    /// Resolve just the A records for a bare domain name.
    pub async fn resolve_a(&self, domain: &str) -> Vec<String> {
        match self.inner.ipv4_lookup(domain).await {
            Ok(lookup) => lookup.iter().map(|ip| ip.to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("NS1.Example.COM."), "ns1.example.com");
        assert_eq!(normalize_name("mail.example.com"), "mail.example.com");
    }
}
