//! In-process rate limiter.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use super::backend::RateLimiterBackend;
use super::client::ClientKey;
use super::clock::{Clock, SystemClock};
use super::rules::{PolicyEntry, RouteClass};
use super::store::{RateLimitDecision, SlidingWindowStore};
use crate::error::Result;

/// The core rate limiter: a [`SlidingWindowStore`] paired with a clock.
///
/// This struct is thread-safe and is shared across request tasks behind an
/// `Arc`. It is constructed once at startup and injected into the middleware.
pub struct RateLimiter {
    store: SlidingWindowStore,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a rate limiter with a custom time source.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: SlidingWindowStore::new(),
            clock,
        }
    }

    /// Evaluate a request at the current time.
    pub fn check_now(
        &self,
        client: &ClientKey,
        class: RouteClass,
        policy: &PolicyEntry,
    ) -> Result<RateLimitDecision> {
        let now = self.clock.now()?;

        trace!(
            client = %client,
            route_class = %class,
            now_ms = now.as_millis() as u64,
            "Checking rate limit"
        );

        self.store.record_and_evaluate(client, class, policy, now)
    }

    /// Reclaim records whose timestamps have all expired.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self) -> Result<usize> {
        let now = self.clock.now()?;
        Ok(self.store.cleanup(now))
    }

    /// The underlying store.
    pub fn store(&self) -> &SlidingWindowStore {
        &self.store
    }

    /// Number of (client, class) records currently tracked.
    pub fn record_count(&self) -> usize {
        self.store.record_count()
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterBackend for RateLimiter {
    async fn check(
        &self,
        client: &ClientKey,
        class: RouteClass,
        policy: &PolicyEntry,
    ) -> Result<RateLimitDecision> {
        self.check_now(client, class, policy)
    }
}
