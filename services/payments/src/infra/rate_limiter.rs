use std::time::Duration;

use tracing::debug;

use crate::domain::repository::{KeyValueStore, RateLimiter};
use crate::domain::types::rate_limit_key;
use crate::error::PaymentServiceError;

/// Fixed-window admission counter.
///
/// The first increment in a window starts the window by setting the counter's
/// expiry; every request in the window increments the same key. Bursts of up to
/// `2 * limit` across a window boundary are possible.
#[derive(Clone)]
pub struct FixedWindowLimiter<K> {
    store: K,
    limit: u64,
    window: Duration,
}

impl<K: KeyValueStore> FixedWindowLimiter<K> {
    pub fn new(store: K, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }
}

impl<K: KeyValueStore> RateLimiter for FixedWindowLimiter<K> {
    async fn allow(&self, subject: &str) -> Result<bool, PaymentServiceError> {
        let key = rate_limit_key(subject);
        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.store.expire(&key, self.window).await?;
        }
        let allowed = u64::try_from(count).is_ok_and(|c| c <= self.limit);
        if !allowed {
            debug!(user_id = subject, count, limit = self.limit, "admission refused");
        }
        Ok(allowed)
    }
}
