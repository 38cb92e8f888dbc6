use std::{collections::HashMap, env, str::FromStr, time::Duration};

use epg_common::{
    helpers::{parse_boolean_flag, parse_comma_list},
    Secret,
};
use epp_tools::EppConfig;
use escrow_engine::{epp::EventType, fees::FeeSchedule, helpers::RetryPolicy, EngineConfig, WebhookPolicy};
use log::*;

const DEFAULT_EPG_HOST: &str = "127.0.0.1";
const DEFAULT_EPG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/escrow.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_DB_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_TOLERANCE_SECS: u64 = 300;
const DEFAULT_INVOICE_DIR: &str = "data/invoices";
const DEFAULT_INVOICE_BASE_URL: &str = "file://data/invoices";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    /// REST client settings for the payment processor
    pub epp: EppConfig,
    pub engine: EngineConfig,
    pub webhooks: WebhookPolicy,
    pub invoices: InvoiceConfig,
}

#[derive(Clone, Debug)]
pub struct InvoiceConfig {
    /// Rendered invoices are written here
    pub dir: String,
    /// Prefix of the url handed back for each invoice
    pub base_url: String,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self { dir: DEFAULT_INVOICE_DIR.to_string(), base_url: DEFAULT_INVOICE_BASE_URL.to_string() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_EPG_HOST.to_string(),
            port: DEFAULT_EPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            epp: EppConfig::default(),
            engine: EngineConfig::default(),
            webhooks: WebhookPolicy::default(),
            invoices: InvoiceConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("EPG_HOST").ok().unwrap_or_else(|| DEFAULT_EPG_HOST.into());
        let port = parse_env("EPG_PORT", DEFAULT_EPG_PORT);
        let database_url = env::var("EPG_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ EPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.into()
        });
        let db_max_connections = parse_env("EPG_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let epp = EppConfig::new_from_env_or_default();
        let engine = engine_config_from_env(epp.timeout);
        let webhooks = webhook_policy_from_env();
        let invoices = InvoiceConfig {
            dir: env::var("EPG_INVOICE_DIR").unwrap_or_else(|_| DEFAULT_INVOICE_DIR.into()),
            base_url: env::var("EPG_INVOICE_BASE_URL").unwrap_or_else(|_| DEFAULT_INVOICE_BASE_URL.into()),
        };
        Self { host, port, database_url, db_max_connections, epp, engine, webhooks, invoices }
    }
}

fn engine_config_from_env(epp_timeout: Duration) -> EngineConfig {
    let max_attempts = parse_env("EPG_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS).max(1);
    let attempt_timeout = Duration::from_millis(parse_env("EPG_DB_TIMEOUT_MS", DEFAULT_DB_TIMEOUT_MS));
    let retry = RetryPolicy { max_attempts, attempt_timeout, ..Default::default() };
    let rates = env::var("EPG_TAX_RATES").map(|s| parse_tax_rates(&s)).unwrap_or_default();
    let fees = FeeSchedule::default().with_tax_rates(0, rates);
    EngineConfig::default().with_fees(fees).with_retry(retry).with_epp_timeout(epp_timeout)
}

fn webhook_policy_from_env() -> WebhookPolicy {
    let platform_secret = env::var("EPG_WEBHOOK_SECRET").unwrap_or_else(|_| {
        warn!("🪛️ EPG_WEBHOOK_SECRET is not set. Every platform webhook will be rejected.");
        String::default()
    });
    let connect_secret = env::var("EPG_CONNECT_WEBHOOK_SECRET").unwrap_or_else(|_| {
        warn!("🪛️ EPG_CONNECT_WEBHOOK_SECRET is not set. Every connected account webhook will be rejected.");
        String::default()
    });
    let mut policy = WebhookPolicy::new(platform_secret, connect_secret);
    policy.development = parse_boolean_flag(env::var("EPG_DEVELOPMENT").ok(), false);
    policy.allow_test_events = parse_boolean_flag(env::var("EPG_ALLOW_TEST_EVENTS").ok(), true);
    policy.tolerance = Duration::from_secs(parse_env("EPG_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS));
    if let Ok(list) = env::var("EPG_ACCEPTED_EVENTS") {
        let accepted = parse_accepted_events(&list);
        if accepted.is_empty() {
            warn!("🪛️ EPG_ACCEPTED_EVENTS names no supported event types. Accepting all of them instead.");
        } else {
            policy.accepted = accepted.into_iter().collect();
        }
    }
    policy
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

/// Parses `JUR=bps` pairs, e.g. `ON=1300,QC=1498`. Malformed entries are skipped.
pub fn parse_tax_rates(value: &str) -> HashMap<String, u32> {
    parse_comma_list(value)
        .into_iter()
        .filter_map(|entry| {
            let (jurisdiction, bps) = entry.split_once('=')?;
            match bps.trim().parse::<u32>() {
                Ok(bps) => Some((jurisdiction.trim().to_ascii_uppercase(), bps)),
                Err(e) => {
                    warn!("🪛️ Ignoring tax rate '{entry}'. {e}");
                    None
                },
            }
        })
        .collect()
}

pub fn parse_accepted_events(value: &str) -> Vec<EventType> {
    parse_comma_list(value)
        .into_iter()
        .filter_map(|name| EventType::from_str(&name).map_err(|e| warn!("🪛️ {e}")).ok())
        .collect()
}

/// The webhook signing secrets, for display purposes.
pub fn secrets_configured(policy: &WebhookPolicy) -> (bool, bool) {
    let set = |s: &Secret<String>| !s.is_empty();
    (set(&policy.platform_secret), set(&policy.connect_secret))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tax_rates() {
        let rates = parse_tax_rates("on=1300, QC=1498,bad,NS=x");
        assert_eq!(rates.len(), 2);
        assert_eq!(rates["ON"], 1_300);
        assert_eq!(rates["QC"], 1_498);
        assert!(parse_tax_rates("").is_empty());
    }

    #[test]
    fn accepted_events() {
        let events = parse_accepted_events("payout.paid, payment_intent.succeeded, charge.refunded");
        assert_eq!(events, vec![EventType::PayoutPaid, EventType::PaymentIntentSucceeded]);
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8370);
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(secrets_configured(&config.webhooks), (false, false));
        assert!(config.webhooks.allow_test_events);
        assert!(!config.webhooks.development);
    }
}
