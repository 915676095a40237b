//! Secret and endpoint registry
//!
//! A flat table of recognized credentials, read once from the environment at
//! startup. Every key is optional; a missing key disables the corresponding
//! feed rather than failing the run.

use serde::Serialize;

/// Read-only credential table shared across the process.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub virustotal_api_key: Option<String>,
    pub recorded_future_api_key: Option<String>,
    pub recorded_future_base_url: Option<String>,
    pub hibp_api_key: Option<String>,
    pub shodan_api_key: Option<String>,
    pub abuseipdb_api_key: Option<String>,
    pub intelx_api_key: Option<String>,
    pub intelx_base_url: Option<String>,
    pub urlscan_api_key: Option<String>,
    pub github_token: Option<String>,
    pub webex_bot_token: Option<String>,
    pub webex_room_id: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            virustotal_api_key: env_var("VIRUSTOTAL_API_KEY"),
            recorded_future_api_key: env_var("RECORDED_FUTURE_API_KEY"),
            recorded_future_base_url: env_var("RECORDED_FUTURE_API_URL"),
            hibp_api_key: env_var("HIBP_API_KEY"),
            shodan_api_key: env_var("SHODAN_API_KEY"),
            abuseipdb_api_key: env_var("ABUSEIPDB_API_KEY"),
            intelx_api_key: env_var("INTELX_API_KEY"),
            intelx_base_url: env_var("INTELX_API_URL"),
            urlscan_api_key: env_var("URLSCAN_API_KEY"),
            github_token: env_var("GITHUB_TOKEN"),
            webex_bot_token: env_var("WEBEX_BOT_TOKEN"),
            webex_room_id: env_var("WEBEX_ROOM_ID"),
        }
    }

    /// Snapshot of which feeds have credentials, for startup logging.
    pub fn feed_status(&self) -> FeedStatus {
        FeedStatus {
            virustotal: self.virustotal_api_key.is_some(),
            recorded_future: self.recorded_future_api_key.is_some(),
            hibp: self.hibp_api_key.is_some(),
            shodan: self.shodan_api_key.is_some(),
            abuseipdb: self.abuseipdb_api_key.is_some(),
            intelx: self.intelx_api_key.is_some(),
            urlscan: self.urlscan_api_key.is_some(),
            github: self.github_token.is_some(),
            webex: self.webex_bot_token.is_some() && self.webex_room_id.is_some(),
        }
    }
}

/// Which upstream feeds are configured for this process.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeedStatus {
    pub virustotal: bool,
    pub recorded_future: bool,
    pub hibp: bool,
    pub shodan: bool,
    pub abuseipdb: bool,
    pub intelx: bool,
    pub urlscan: bool,
    pub github: bool,
    pub webex: bool,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_nothing_configured() {
        let secrets = Secrets::default();
        let status = secrets.feed_status();
        assert!(!status.virustotal);
        assert!(!status.hibp);
        assert!(!status.webex);
    }

    #[test]
    fn test_webex_requires_token_and_room() {
        let secrets = Secrets {
            webex_bot_token: Some("token".into()),
            ..Default::default()
        };
        assert!(!secrets.feed_status().webex);

        let secrets = Secrets {
            webex_bot_token: Some("token".into()),
            webex_room_id: Some("room".into()),
            ..Default::default()
        };
        assert!(secrets.feed_status().webex);
    }
}
