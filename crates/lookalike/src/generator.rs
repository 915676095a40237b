//! Lookalike candidate generation
//!
//! Combines the algorithmic fuzzers with the malicious-TLD expansion,
//! resolves the result set, and optionally filters to registered domains.
//! Generation is bounded by a hard deadline so the orchestrator never
//! blocks indefinitely on a slow resolver.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};

use watchtower_core::model::Candidate;

use crate::fuzzers;
use crate::resolver::{CandidateResolver, DEFAULT_RESOLVE_WORKERS};

/// Deadline when DNS resolution is enabled.
const DEADLINE_WITH_DNS: Duration = Duration::from_secs(30 * 60);
/// Deadline for generation without resolution.
const DEADLINE_WITHOUT_DNS: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Only admit candidates with at least one A/AAAA/MX record.
    pub registered_only: bool,
    /// Append variants across the abuse-heavy TLD list.
    pub include_malicious_tlds: bool,
    /// Resolve DNS for generated candidates.
    pub resolve_dns: bool,
    pub resolve_workers: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            registered_only: true,
            include_malicious_tlds: true,
            resolve_dns: true,
            resolve_workers: DEFAULT_RESOLVE_WORKERS,
        }
    }
}

pub struct LookalikeGenerator {
    resolver: CandidateResolver,
}

impl LookalikeGenerator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            resolver: CandidateResolver::new()?,
        })
    }

    /// Generate, resolve, and filter lookalike candidates for a seed.
    pub async fn generate(
        &self,
        seed: &str,
        options: &GeneratorOptions,
    ) -> Result<Vec<Candidate>> {
        let deadline = if options.resolve_dns {
            DEADLINE_WITH_DNS
        } else {
            DEADLINE_WITHOUT_DNS
        };

        match tokio::time::timeout(deadline, self.generate_inner(seed, options)).await {
            Ok(candidates) => Ok(candidates),
            Err(_) => bail!(
                "lookalike generation for {seed} exceeded {}s deadline",
                deadline.as_secs()
            ),
        }
    }

    async fn generate_inner(&self, seed: &str, options: &GeneratorOptions) -> Vec<Candidate> {
        let seed = seed.trim().to_lowercase();
        info!(seed, "generating lookalike candidates");

        let mut variants = fuzzers::all_variants(&seed);
        if options.include_malicious_tlds {
            let existing: std::collections::HashSet<String> =
                variants.iter().map(|v| v.domain.clone()).collect();
            let tld_variants: Vec<_> = fuzzers::malicious_tld_variants(&seed)
                .into_iter()
                .filter(|v| !existing.contains(&v.domain))
                .collect();
            info!(count = tld_variants.len(), "added malicious TLD variations");
            variants.extend(tld_variants);
        }

        let mut candidates: Vec<Candidate> = variants
            .into_iter()
            .map(|v| Candidate::new(v.domain, v.fuzzer))
            .collect();

        if options.resolve_dns {
            self.resolver
                .resolve_batch(&mut candidates, options.resolve_workers)
                .await;
        } else if options.registered_only {
            warn!(seed, "registered_only requires DNS resolution; returning all candidates");
        }

        if options.registered_only && options.resolve_dns {
            candidates.retain(|c| c.registered);
        }

        info!(
            seed,
            total = candidates.len(),
            registered = candidates.iter().filter(|c| c.registered).count(),
            "lookalike generation complete"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = GeneratorOptions::default();
        assert!(options.registered_only);
        assert!(options.include_malicious_tlds);
        assert!(options.resolve_dns);
    }
}
