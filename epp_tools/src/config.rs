use std::time::Duration;

use epg_common::Secret;
use log::*;

const DEFAULT_API_URL: &str = "https://api.stripe.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct EppConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    /// Applied by the HTTP client to every request
    pub timeout: Duration,
}

impl Default for EppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: Secret::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl EppConfig {
    pub fn new<S: Into<String>>(api_url: S, api_key: S) -> Self {
        Self { api_url: api_url.into(), api_key: Secret::new(api_key.into()), ..Default::default() }
    }

    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("EPG_EPP_API_URL").unwrap_or_else(|_| {
            info!("🪛️ EPG_EPP_API_URL not set, using {DEFAULT_API_URL}");
            DEFAULT_API_URL.to_string()
        });
        let api_key = Secret::new(std::env::var("EPG_EPP_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ EPG_EPP_API_KEY not set. Every call to the payment processor will be refused.");
            String::default()
        }));
        let timeout = std::env::var("EPG_EPP_TIMEOUT_MS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid EPG_EPP_TIMEOUT_MS ({s}). {e}. Using the default."))
                    .ok()
            })
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self { api_url: api_url.trim_end_matches('/').to_string(), api_key, timeout: Duration::from_millis(timeout) }
    }
}
