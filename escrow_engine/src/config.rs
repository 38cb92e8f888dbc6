//! Engine configuration.
//!
//! These structs are built once at start-up (the server reads them from the environment) and handed to the APIs by
//! value. Nothing in the engine mutates them afterwards.
use std::{collections::HashSet, time::Duration};

use epg_common::Secret;

use crate::{epp::EventType, fees::FeeSchedule, helpers::retry::RetryPolicy};

pub const DEFAULT_EPP_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fees: FeeSchedule,
    pub retry: RetryPolicy,
    /// Upper bound on every call made to the payment processor
    pub epp_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { fees: FeeSchedule::default(), retry: RetryPolicy::default(), epp_timeout: DEFAULT_EPP_TIMEOUT }
    }
}

impl EngineConfig {
    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_epp_timeout(mut self, timeout: Duration) -> Self {
        self.epp_timeout = timeout;
        self
    }
}

/// The two webhook entry points. Each has its own signing secret at the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningContext {
    /// Events about the platform's own account
    Platform,
    /// Events about connected (payee) accounts
    Connect,
}

impl std::fmt::Display for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Platform => write!(f, "platform"),
            Self::Connect => write!(f, "connect"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookPolicy {
    pub accepted: HashSet<EventType>,
    /// A development deployment processes test-mode events regardless of `allow_test_events`
    pub development: bool,
    /// Whether test-mode events for connected accounts are processed
    pub allow_test_events: bool,
    pub tolerance: Duration,
    pub platform_secret: Secret<String>,
    pub connect_secret: Secret<String>,
}

impl Default for WebhookPolicy {
    fn default() -> Self {
        Self {
            accepted: EventType::ALL.into_iter().collect(),
            development: false,
            allow_test_events: true,
            tolerance: DEFAULT_SIGNATURE_TOLERANCE,
            platform_secret: Secret::default(),
            connect_secret: Secret::default(),
        }
    }
}

impl WebhookPolicy {
    pub fn new<S: Into<String>>(platform_secret: S, connect_secret: S) -> Self {
        Self {
            platform_secret: Secret::new(platform_secret.into()),
            connect_secret: Secret::new(connect_secret.into()),
            ..Default::default()
        }
    }

    pub fn secret_for(&self, context: SigningContext) -> &Secret<String> {
        match context {
            SigningContext::Platform => &self.platform_secret,
            SigningContext::Connect => &self.connect_secret,
        }
    }

    pub fn accepts(&self, event_type: EventType) -> bool {
        self.accepted.contains(&event_type)
    }

    /// Test-mode events that target a connected account are dropped unless they are explicitly allowed or this is a
    /// development deployment.
    pub fn should_drop(&self, livemode: bool, account: Option<&str>) -> bool {
        !self.development && !self.allow_test_events && !livemode && account.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drop_rules() {
        let mut policy = WebhookPolicy::default();
        assert!(!policy.should_drop(false, Some("acct_1")));
        policy.allow_test_events = false;
        assert!(policy.should_drop(false, Some("acct_1")));
        assert!(!policy.should_drop(true, Some("acct_1")));
        assert!(!policy.should_drop(false, None));
        policy.development = true;
        assert!(!policy.should_drop(false, Some("acct_1")));
        // Outside development the flag is all that decides
        policy.development = false;
        policy.allow_test_events = true;
        assert!(!policy.should_drop(false, Some("acct_1")));
    }

    #[test]
    fn all_events_accepted_by_default() {
        let policy = WebhookPolicy::default();
        assert!(EventType::ALL.iter().all(|t| policy.accepts(*t)));
    }
}
