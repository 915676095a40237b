//! Parking detection cascade
//!
//! Three tiers, first definitive answer wins:
//! 1. Nameserver match against known parking-service nameservers
//! 2. URLScan page categorization from existing public scans
//! 3. HTTP content probe with redirect, URL-parameter, and body analysis
//!
//! Network failure at every tier yields an unknown verdict rather than a
//! guess. Batch classification fans out over a bounded worker pool with no
//! shared mutable state between checks.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info};

use watchtower_core::model::{Candidate, Confidence};
use watchtower_feeds::urlscan::UrlscanClient;

/// Default worker count for batch parking checks.
pub const DEFAULT_PARKING_WORKERS: usize = 10;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes use a browser user agent; parking landers serve bots differently.
const PROBE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Nameservers operated by parking services. Derived from the MISP
/// parking-domain-ns warning list plus entries added for observed false
/// negatives.
const PARKING_NAMESERVERS: &[&str] = &[
    "above.com",
    "afternic.com",
    "alter.com",
    "atom.com",
    "bodis.com",
    "bookmyname.com",
    "brainydns.com",
    "brandbucket.com",
    "chookdns.com",
    "cnomy.com",
    "commonmx.com",
    "dan.com",
    "day.biz",
    "dingodns.com",
    "directnic.com",
    "dne.com",
    "dnslink.com",
    "dnsnuts.com",
    "dnsowl.com",
    "dnsspark.com",
    "domain-for-sale.at",
    "domain-for-sale.se",
    "domaincntrol.com",
    "domainhasexpired.com",
    "domainist.com",
    "domainmarket.com",
    "domainmx.com",
    "domainorderdns.nl",
    "domainparking.ru",
    "domainprofi.de",
    "domainrecover.com",
    "dsredirection.com",
    "dsredirects.com",
    "eftydns.com",
    "emailverification.info",
    "emu-dns.com",
    "expiereddnsmanager.com",
    "expirationwarning.net",
    "fabulous.com",
    "fastpark.net",
    "freenom.com",
    "gname.net",
    "hastydns.com",
    "hostresolver.com",
    "ibspark.com",
    "kirklanddc.com",
    "koaladns.com",
    "magpiedns.com",
    "malkm.com",
    "markmonitor.com",
    "mijndomein.nl",
    "milesmx.com",
    "mytrafficmanagement.com",
    "namedynamics.net",
    "nameprovider.net",
    "ndsplitter.com",
    "nsresolution.com",
    "onlydomains.com",
    "panamans.com",
    "parking-page.net",
    "parkingcrew.net",
    "parkingspa.com",
    "parklogic.com",
    "parktons.com",
    "perfectdomain.com",
    "quokkadns.com",
    "redirectdom.com",
    "redmonddc.com",
    "renewyourname.net",
    "rentondc.com",
    "rookdns.com",
    "rzone.de",
    "sav.com",
    "searchfusion.com",
    "searchreinvented.com",
    "securetrafficrouting.com",
    "sedo.com",
    "sedoparking.com",
    "smtmdns.com",
    "snparking.ru",
    "squadhelp.com",
    "sslparking.com",
    "tacomadc.com",
    "taipandns.com",
    "thednscloud.com",
    "torresdns.com",
    "trafficcontrolrouter.com",
    "voodoo.com",
    "weaponizedcow.com",
    "wombatdns.com",
    "ztomy.com",
    // Specific NS hostnames
    "ns01.cashparking.com",
    "ns02.cashparking.com",
    "ns1.namefind.com",
    "ns2.namefind.com",
    "ns1.park.do",
    "ns2.park.do",
    "ns1.pql.net",
    "ns2.pql.net",
    "ns1.smartname.com",
    "ns2.smartname.com",
    "ns1.sonexo.eu",
    "ns2.sonexo.com",
    "ns1.undeveloped.com",
    "ns2.undeveloped.com",
    "ns3.tppns.com",
    "ns4.tppns.com",
    "park1.encirca.net",
    "park2.encirca.net",
    "parkdns1.internetvikings.com",
    "parkdns2.internetvikings.com",
    "parking.namecheap.com",
    "parking1.ovh.net",
    "parking2.ovh.net",
    "parkingpage.namecheap.com",
    "expired.uniregistry-dns.com",
    "uniregistrymarket.link",
];

/// Domain marketplaces; a redirect landing on one of these means parked.
const DOMAIN_MARKETPLACE_HOSTS: &[&str] = &[
    "domains.atom.com",
    "atom.com",
    "sedo.com",
    "sedoparking.com",
    "dan.com",
    "afternic.com",
    "hugedomains.com",
    "bodis.com",
    "parkingcrew.net",
    "above.com",
    "sav.com",
    "domainnamesales.com",
    "undeveloped.com",
    "domainmarket.com",
    "brandpa.com",
    "squadhelp.com",
    "searchhounds.com",
    "godaddy.com",
    "porkbun.com",
    "namecheap.com",
    "dynadot.com",
    "epik.com",
    "uniregistry.com",
    "brandbucket.com",
    "buydomains.com",
    "domainagents.com",
    "parklogic.com",
];

/// URL parameters parking services use to carry the original domain.
const PARKING_URL_PARAMS: &[&str] = &["domain", "d", "siteid", "site_id", "ref", "source"];

/// Body patterns covering parking catch-phrases and lander scripts.
const PARKING_INDICATOR_PATTERNS: &[&str] = &[
    r"this domain is for sale",
    r"buy this domain",
    r"domain for sale",
    r"domain is parked",
    r"parked by",
    r"parked domain",
    r"parked free",
    r"this domain may be for sale",
    r"make an offer",
    r"domain parking",
    r"acquire this domain",
    r"purchase this domain",
    r"domain available",
    r"is available for purchase",
    r"sedoparking\.com",
    r"sedo domain parking",
    r"sedo\.com",
    r"bodis\.com",
    r"parkingcrew\.net",
    r"above\.com",
    r"hugedomains\.com",
    r"afternic\.com",
    r"dan\.com",
    r"sav\.com",
    r"atom\.com",
    r"godaddy.*parked",
    r"namecheap.*parked",
    r"registered with namecheap",
    r"recently been registered",
    r"domainnamesales\.com",
    r"undeveloped\.com",
    r"domainmarket\.com",
    r"brandpa\.com",
    r"squadhelp\.com",
    r"sponsored listings",
    r"related searches",
    r"relevant searches",
    r"click here to inquire",
    r"LANDER_SYSTEM",
    r"parking-lander",
    r"wsimg\.com.*parking",
    r"google\.com/adsense/domains",
    r"adsense/domains/caf\.js",
];

/// Detailed parking verdict for one domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParkingVerdict {
    /// `Some(true)` parked, `Some(false)` active, `None` undetermined.
    pub is_parked: Option<bool>,
    pub provider: Option<String>,
    pub confidence: Option<Confidence>,
    pub indicators: Vec<String>,
    pub final_url: Option<String>,
}

impl ParkingVerdict {
    fn parked_high(indicator: String, provider: Option<String>) -> Self {
        Self {
            is_parked: Some(true),
            confidence: Some(Confidence::High),
            indicators: vec![indicator],
            provider,
            final_url: None,
        }
    }
}

struct ContentCheck {
    is_parked: bool,
    provider: Option<String>,
    indicators: Vec<String>,
}

pub struct ParkingClassifier {
    patterns: Vec<Regex>,
    lander_redirect: Regex,
    parking_ns: AHashSet<&'static str>,
    http: reqwest::Client,
    urlscan: Option<Arc<UrlscanClient>>,
}

impl ParkingClassifier {
    pub fn new(urlscan: Option<Arc<UrlscanClient>>) -> Result<Self> {
        let patterns = PARKING_INDICATOR_PATTERNS
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            lander_redirect: Regex::new(r#"window\.location\.href\s*=\s*["']([^"']+)["']"#)?,
            parking_ns: PARKING_NAMESERVERS.iter().copied().collect(),
            http: reqwest::Client::builder()
                .timeout(PROBE_TIMEOUT)
                .user_agent(PROBE_USER_AGENT)
                .build()?,
            urlscan,
        })
    }

    /// Tier 1: nameserver verdict. Returns a verdict only when the NS set
    /// definitively indicates parking; anything else falls through.
    pub fn ns_verdict(&self, ns_records: &[String]) -> Option<ParkingVerdict> {
        for ns in ns_records {
            let ns_lower = ns.to_lowercase();
            let ns_lower = ns_lower.trim_end_matches('.');

            let matched = self.parking_ns.contains(ns_lower)
                || self
                    .parking_ns
                    .iter()
                    .any(|parking| ns_lower.ends_with(&format!(".{parking}")));
            if matched {
                debug!(ns = %ns, "nameserver matches known parking provider");
                let provider = DOMAIN_MARKETPLACE_HOSTS
                    .iter()
                    .find(|m| ns_lower.contains(*m))
                    .map(|m| m.to_string());
                return Some(ParkingVerdict::parked_high(
                    "nameserver matches known parking provider".to_string(),
                    provider,
                ));
            }
        }
        None
    }

    /// Full cascade for one domain.
    pub async fn classify(&self, domain: &str, ns_records: &[String]) -> ParkingVerdict {
        if let Some(verdict) = self.ns_verdict(ns_records) {
            return verdict;
        }

        if let Some(urlscan) = &self.urlscan {
            match urlscan.check_parking_status(domain).await {
                Some(true) => {
                    return ParkingVerdict::parked_high(
                        "URLScan categorized as parked".to_string(),
                        None,
                    )
                }
                Some(false) => {
                    return ParkingVerdict {
                        is_parked: Some(false),
                        confidence: Some(Confidence::Medium),
                        indicators: vec!["URLScan categorized as active content".to_string()],
                        ..Default::default()
                    }
                }
                None => {}
            }
        }

        self.probe_content(domain).await
    }

    /// Tier 3: fetch the site and look for parking signals in the redirect
    /// chain, query parameters, and body.
    async fn probe_content(&self, domain: &str) -> ParkingVerdict {
        let mut verdict = ParkingVerdict::default();

        for protocol in ["https", "http"] {
            let url = format!("{protocol}://{domain}");
            let response = match self.http.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    verdict.indicators.push(if e.is_timeout() {
                        "connection timeout".to_string()
                    } else {
                        "connection error".to_string()
                    });
                    continue;
                }
            };

            let final_url = response.url().clone();
            let body = match response.text().await {
                Ok(b) => b,
                Err(_) => {
                    verdict.indicators.push("unreadable response body".to_string());
                    continue;
                }
            };

            verdict.final_url = Some(final_url.to_string());

            let mut check = self.evaluate_content(domain, &final_url, &body);

            // GoDaddy-style landers arrive via a JavaScript redirect; fetch
            // the lander once and re-evaluate.
            if !check.is_parked {
                if let Some(path) = self.find_lander_redirect(&body) {
                    let lander_url = if path.starts_with('/') {
                        format!("{protocol}://{domain}{path}")
                    } else {
                        path.clone()
                    };
                    if let Ok(lander) = self.http.get(&lander_url).send().await {
                        let lander_final = lander.url().clone();
                        if let Ok(lander_body) = lander.text().await {
                            verdict.final_url = Some(lander_final.to_string());
                            let lander_check =
                                self.evaluate_content(domain, &lander_final, &lander_body);
                            check.is_parked |= lander_check.is_parked;
                            check.provider = check.provider.or(lander_check.provider);
                            check
                                .indicators
                                .push(format!("JavaScript redirect to: {path}"));
                            check.indicators.extend(lander_check.indicators);
                        }
                    }
                }
            }

            verdict.is_parked = Some(check.is_parked);
            verdict.provider = check.provider;
            verdict.indicators.extend(check.indicators);
            verdict.confidence = Some(if check.is_parked {
                if verdict.provider.is_some() && verdict.indicators.len() > 1 {
                    Confidence::High
                } else {
                    Confidence::Medium
                }
            } else {
                Confidence::Low
            });

            return verdict;
        }

        // Every tier failed; leave the tri-state unknown.
        verdict
    }

    fn evaluate_content(&self, domain: &str, final_url: &Url, body: &str) -> ContentCheck {
        let mut check = ContentCheck {
            is_parked: false,
            provider: None,
            indicators: Vec::new(),
        };

        let final_host = final_url
            .host_str()
            .unwrap_or("")
            .trim_start_matches("www.")
            .to_lowercase();
        let redirected = final_host != domain && final_host != format!("www.{domain}");

        for marketplace in DOMAIN_MARKETPLACE_HOSTS {
            if final_host == *marketplace || final_host.ends_with(&format!(".{marketplace}")) {
                check.is_parked = true;
                check.provider = Some(marketplace.to_string());
                check
                    .indicators
                    .push(format!("redirected to parking domain: {marketplace}"));
                break;
            }
        }

        for (key, value) in final_url.query_pairs() {
            let key = key.to_lowercase();
            if PARKING_URL_PARAMS.contains(&key.as_str())
                && value.to_lowercase().contains(&domain.to_lowercase())
            {
                check
                    .indicators
                    .push(format!("URL parameter \"{key}\" references original domain"));
                if redirected {
                    check.is_parked = true;
                }
            }
        }

        if !check.is_parked {
            let body_lower = body.to_lowercase();
            for pattern in &self.patterns {
                if let Some(matched) = pattern.find(&body_lower) {
                    check.is_parked = true;
                    check
                        .indicators
                        .push(format!("content matched: \"{}\"", matched.as_str()));
                    if body_lower.contains("wsimg.com") || body_lower.contains("lander_system") {
                        check.provider = Some("godaddy.com".to_string());
                    } else {
                        check.provider = DOMAIN_MARKETPLACE_HOSTS
                            .iter()
                            .find(|m| body_lower.contains(*m))
                            .map(|m| m.to_string());
                    }
                    break;
                }
            }
        }

        check
    }

    fn find_lander_redirect(&self, body: &str) -> Option<String> {
        let captures = self.lander_redirect.captures(body)?;
        let path = captures.get(1)?.as_str();
        path.to_lowercase().contains("lander").then(|| path.to_string())
    }

    /// Classify a batch of candidates, writing parking fields in place.
    /// Unregistered candidates get an explicit unknown verdict.
    pub async fn classify_batch(&self, candidates: &mut [Candidate], workers: usize) {
        let registered = candidates.iter().filter(|c| c.registered).count();
        info!(registered, workers, "checking parking status");

        stream::iter(candidates.iter_mut())
            .for_each_concurrent(workers.max(1), |candidate| async move {
                if !candidate.registered {
                    candidate.parked = None;
                    candidate.parking_provider = None;
                    candidate.parking_confidence = None;
                    candidate.parking_indicators = Vec::new();
                    candidate.parking_final_url = None;
                    return;
                }

                let verdict = self.classify(&candidate.domain, &candidate.dns_ns).await;
                candidate.parked = verdict.is_parked;
                candidate.parking_provider = verdict.provider;
                candidate.parking_confidence = verdict.confidence;
                candidate.parking_indicators = verdict.indicators;
                candidate.parking_final_url = verdict.final_url;
            })
            .await;

        let parked = candidates.iter().filter(|c| c.parked == Some(true)).count();
        info!(parked, "parking check complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ParkingClassifier {
        ParkingClassifier::new(None).unwrap()
    }

    #[test]
    fn test_ns_verdict_exact_and_subdomain_match() {
        let c = classifier();

        let verdict = c
            .ns_verdict(&["ns1.sedoparking.com".to_string()])
            .expect("sedoparking NS should be parked");
        assert_eq!(verdict.is_parked, Some(true));
        assert_eq!(verdict.confidence, Some(Confidence::High));
        assert_eq!(verdict.provider.as_deref(), Some("sedoparking.com"));

        // Trailing dots are tolerated.
        assert!(c.ns_verdict(&["NS2.BODIS.COM.".to_string()]).is_some());
    }

    #[test]
    fn test_ns_verdict_inconclusive_for_normal_ns() {
        let c = classifier();
        assert!(c.ns_verdict(&["ns1.cloudflare.com".to_string()]).is_none());
        assert!(c.ns_verdict(&[]).is_none());
    }

    #[test]
    fn test_content_patterns_detect_parking() {
        let c = classifier();
        let url = Url::parse("https://acmee.com/").unwrap();

        let check = c.evaluate_content(
            "acmee.com",
            &url,
            "<html><body>This Domain Is For Sale - contact broker</body></html>",
        );
        assert!(check.is_parked);
        assert!(!check.indicators.is_empty());

        let check = c.evaluate_content(
            "acmee.com",
            &url,
            "<html><head><script src=\"https://i.wsimg.com/parking/js/lander.js\"></script></head></html>",
        );
        assert!(check.is_parked);
        assert_eq!(check.provider.as_deref(), Some("godaddy.com"));
    }

    #[test]
    fn test_marketplace_redirect_detected() {
        let c = classifier();
        let url = Url::parse("https://www.hugedomains.com/domain_profile.cfm?d=acmee").unwrap();
        let check = c.evaluate_content("acmee.com", &url, "<html></html>");
        assert!(check.is_parked);
        assert_eq!(check.provider.as_deref(), Some("hugedomains.com"));
    }

    #[test]
    fn test_parking_url_param_references_domain() {
        let c = classifier();
        let url = Url::parse("https://parked.example/lander?domain=acmee.com").unwrap();
        let check = c.evaluate_content("acmee.com", &url, "<html></html>");
        assert!(check.is_parked);
        assert!(check
            .indicators
            .iter()
            .any(|i| i.contains("URL parameter")));
    }

    #[test]
    fn test_real_content_not_parked() {
        let c = classifier();
        let url = Url::parse("https://acmee.com/").unwrap();
        let check = c.evaluate_content(
            "acmee.com",
            &url,
            "<html><body><h1>Welcome to our product page</h1></body></html>",
        );
        assert!(!check.is_parked);
    }

    #[test]
    fn test_lander_redirect_extraction() {
        let c = classifier();
        assert_eq!(
            c.find_lander_redirect(r#"<script>window.location.href="/lander";</script>"#),
            Some("/lander".to_string())
        );
        assert_eq!(
            c.find_lander_redirect(r#"<script>window.location.href="/home";</script>"#),
            None
        );
        assert_eq!(c.find_lander_redirect("no scripts here"), None);
    }

    #[tokio::test]
    async fn test_cascade_short_circuits_on_ns_match() {
        // The domain is unroutable; if the cascade reached the HTTP tier the
        // verdict would come back unknown. A parked/high verdict proves the
        // nameserver tier answered without probing.
        let c = classifier();
        let verdict = c
            .classify("invalid.invalid", &["ns1.parkingcrew.net".to_string()])
            .await;
        assert_eq!(verdict.is_parked, Some(true));
        assert_eq!(verdict.confidence, Some(Confidence::High));
    }
}
