//! Bounded retry with a fixed delay: used by background refreshes that
//! must never bother the operator.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dialdesk_core::Result;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Running totals for background refreshes.
#[derive(Debug, Default)]
pub struct RetryStats {
    succeeded: AtomicU64,
    retried: AtomicU64,
    abandoned: AtomicU64,
}

impl RetryStats {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
pub async fn retry_fixed<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    stats: &RetryStats,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                stats.retried.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("{label} failed (attempt {attempt}), retrying: {e}");
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                stats.abandoned.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }
    }
}
