//! Client registry
//!
//! All feed clients are constructed once at startup from the secret table
//! and passed through the orchestrator. No lazy singletons; the only
//! process-wide mutable state lives inside the clients' TTL caches.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use watchtower_core::Secrets;

use crate::abusech::AbuseChClient;
use crate::abuseipdb::AbuseIpDbClient;
use crate::crtsh::CtClient;
use crate::hibp::HibpClient;
use crate::intelx::IntelxClient;
use crate::leaks::LeakMonitor;
use crate::rdap::RdapClient;
use crate::recorded_future::RecordedFutureClient;
use crate::shodan::ShodanClient;
use crate::urlscan::UrlscanClient;
use crate::virustotal::VirusTotalClient;

pub struct ClientRegistry {
    pub virustotal: VirusTotalClient,
    pub recorded_future: RecordedFutureClient,
    pub abusech: AbuseChClient,
    pub abuseipdb: AbuseIpDbClient,
    pub hibp: HibpClient,
    pub shodan: ShodanClient,
    pub ct: CtClient,
    pub intelx: IntelxClient,
    /// Shared with the parking classifier, which memoizes verdicts in it.
    pub urlscan: Arc<UrlscanClient>,
    pub leaks: LeakMonitor,
    pub rdap: RdapClient,
}

impl ClientRegistry {
    pub fn new(secrets: &Secrets) -> Result<Self> {
        let registry = Self {
            virustotal: VirusTotalClient::new(secrets.virustotal_api_key.clone())?,
            recorded_future: RecordedFutureClient::new(
                secrets.recorded_future_api_key.clone(),
                secrets.recorded_future_base_url.clone(),
            )?,
            abusech: AbuseChClient::new()?,
            abuseipdb: AbuseIpDbClient::new(secrets.abuseipdb_api_key.clone())?,
            hibp: HibpClient::new(secrets.hibp_api_key.clone())?,
            shodan: ShodanClient::new(secrets.shodan_api_key.clone())?,
            ct: CtClient::new()?,
            intelx: IntelxClient::new(
                secrets.intelx_api_key.clone(),
                secrets.intelx_base_url.clone(),
            )?,
            urlscan: Arc::new(UrlscanClient::new(secrets.urlscan_api_key.clone())?),
            leaks: LeakMonitor::new(secrets.github_token.clone())?,
            rdap: RdapClient::new()?,
        };

        info!(status = ?secrets.feed_status(), "feed clients initialized");
        Ok(registry)
    }
}
