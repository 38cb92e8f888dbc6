//! Retry loop for ledger work that can collide with concurrent writers.
use std::{future::Future, time::Duration};

use log::*;

use crate::traits::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// The wait after the first failed attempt. Subsequent waits grow linearly.
    pub backoff: Duration,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_millis(50), attempt_timeout: Duration::from_secs(5) }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or `policy.max_attempts` is used up.
///
/// Only [`LedgerError::Conflict`] is retried. An attempt that exceeds `policy.attempt_timeout` fails with
/// [`LedgerError::Timeout`] and is not retried, since the ledger work may be stuck behind a lock that will not clear.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(r) => r,
            Err(_) => {
                warn!("🗃️ {label} timed out after {}ms (attempt {attempt})", policy.attempt_timeout.as_millis());
                return Err(LedgerError::Timeout(format!("{label} exceeded {}ms", policy.attempt_timeout.as_millis())));
            },
        };
        match result {
            Err(LedgerError::Conflict(reason)) if attempt < max_attempts => {
                let wait = policy.backoff * attempt;
                debug!("🗃️ {label} hit a write conflict ({reason}). Retrying in {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
                attempt += 1;
            },
            other => return other,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, backoff: Duration::from_millis(1), attempt_timeout: Duration::from_millis(200) }
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retries(&policy(), "test", || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(LedgerError::Conflict("database is locked".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = with_retries(&policy(), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::Conflict("busy".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(LedgerError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = with_retries(&policy(), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::DatabaseError("constraint failed".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(LedgerError::DatabaseError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let result: Result<(), _> = with_retries(&policy(), "test", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(LedgerError::Timeout(_))));
    }
}
