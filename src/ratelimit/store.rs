//! Sliding-window store shared by all in-flight requests.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use super::client::ClientKey;
use super::rules::{PolicyEntry, RouteClass};
use super::window::WindowRecord;
use crate::error::{EventgateError, Result};

/// Identifies one [`WindowRecord`] in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub client: ClientKey,
    pub class: RouteClass,
}

impl RecordKey {
    pub fn new(client: ClientKey, class: RouteClass) -> Self {
        Self { client, class }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.class, self.client)
    }
}

/// Outcome of evaluating one request against its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The request limit that was applied
    pub limit: u32,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Unix seconds at which the window fully clears for this client and class
    pub reset_at: u64,
    /// Seconds until the next request can be admitted, only set on rejection
    pub retry_after: Option<u64>,
}

/// Concurrency-safe ledger of accepted request timestamps.
///
/// Records are keyed by (client, route class) and sharded across the
/// underlying map, so one client's evaluation only blocks clients hashed to
/// the same shard. The whole check-then-record sequence for a key runs under
/// that shard's write lock, which is what prevents concurrent requests from
/// admitting more than the limit.
#[derive(Debug, Default)]
pub struct SlidingWindowStore {
    records: DashMap<RecordKey, WindowRecord>,
}

impl SlidingWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Evaluate a request at `now` and record it if admitted.
    ///
    /// `reset_at` is `now + window` when the record held nothing before this
    /// call, otherwise `oldest + window`.
    pub fn record_and_evaluate(
        &self,
        client: &ClientKey,
        class: RouteClass,
        policy: &PolicyEntry,
        now: Duration,
    ) -> Result<RateLimitDecision> {
        policy
            .validate()
            .map_err(|e| EventgateError::Store(format!("refusing to evaluate {}: {}", class, e)))?;

        let window = policy.window();
        let limit = policy.request_limit;
        let key = RecordKey::new(client.clone(), class);

        let mut record = self
            .records
            .entry(key)
            .or_insert_with(|| WindowRecord::new(window));

        if record.window() != window {
            record.set_window(window);
        }

        let purged = record.purge(now);
        let count = record.len();
        let oldest = record.oldest();

        trace!(
            key = %record.key(),
            count = count,
            purged = purged,
            limit = limit,
            "Evaluating sliding window"
        );

        let reset_at = oldest.unwrap_or(now).checked_add(window).ok_or_else(|| {
            EventgateError::Store(format!(
                "window of {}s overflows the reset time for {}",
                policy.window_seconds,
                record.key()
            ))
        })?;

        if count < limit as usize {
            record.record(now);
            return Ok(RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - count as u32 - 1,
                reset_at: reset_at.as_secs(),
                retry_after: None,
            });
        }

        // count >= limit > 0, so the record cannot be empty here
        if oldest.is_none() {
            return Err(EventgateError::Store(format!(
                "record {} is full but holds no timestamps",
                record.key()
            )));
        }
        let retry_after = reset_at.saturating_sub(now).as_secs();

        debug!(
            key = %record.key(),
            count = count,
            limit = limit,
            retry_after = retry_after,
            "Sliding window full"
        );

        Ok(RateLimitDecision {
            allowed: false,
            limit,
            remaining: 0,
            reset_at: reset_at.as_secs(),
            retry_after: Some(retry_after),
        })
    }

    /// Purge every record at `now` and drop the ones left empty.
    ///
    /// Returns the number of records removed. Only reclaims memory; decisions
    /// always purge inline and never depend on this having run.
    pub fn cleanup(&self, now: Duration) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            record.purge(now);
            if record.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Number of retained timestamps for a key, without purging.
    pub fn timestamp_count(&self, client: &ClientKey, class: RouteClass) -> Option<usize> {
        self.records
            .get(&RecordKey::new(client.clone(), class))
            .map(|r| r.len())
    }

    /// Number of (client, class) records currently tracked.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Drop all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const T0: u64 = 1_700_000_000;

    fn at(offset: u64) -> Duration {
        Duration::from_secs(T0 + offset)
    }

    fn client(name: &str) -> ClientKey {
        ClientKey::new(name)
    }

    fn policy(limit: u32, window: u64) -> PolicyEntry {
        PolicyEntry::new(limit, window).unwrap()
    }

    #[test]
    fn test_burst_then_reject_with_retry_after() {
        let store = SlidingWindowStore::new();
        let policy = policy(3, 10);
        let c = client("C");

        let remaining: Vec<u32> = (0..3)
            .map(|t| {
                let d = store
                    .record_and_evaluate(&c, RouteClass::Global, &policy, at(t))
                    .unwrap();
                assert!(d.allowed);
                assert_eq!(d.retry_after, None);
                d.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let d = store
            .record_and_evaluate(&c, RouteClass::Global, &policy, at(3))
            .unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.retry_after, Some(7));
        assert_eq!(d.reset_at, T0 + 10);
        // Rejections are not recorded
        assert_eq!(store.timestamp_count(&c, RouteClass::Global), Some(3));
    }

    #[test]
    fn test_window_slides_past_old_requests() {
        let store = SlidingWindowStore::new();
        let policy = policy(3, 10);
        let c = client("C");

        let first = store
            .record_and_evaluate(&c, RouteClass::Global, &policy, at(0))
            .unwrap();
        assert!(first.allowed);
        assert_eq!(first.reset_at, T0 + 10);

        let later = store
            .record_and_evaluate(&c, RouteClass::Global, &policy, at(11))
            .unwrap();
        assert!(later.allowed);
        assert_eq!(later.remaining, 2);
        assert_eq!(later.reset_at, T0 + 21);
    }

    #[test]
    fn test_sliding_not_fixed_bucket() {
        let store = SlidingWindowStore::new();
        let policy = policy(2, 10);
        let c = client("C");

        // Two requests late in one "bucket"
        assert!(store.record_and_evaluate(&c, RouteClass::Global, &policy, at(8)).unwrap().allowed);
        assert!(store.record_and_evaluate(&c, RouteClass::Global, &policy, at(9)).unwrap().allowed);

        // Just past a fixed bucket edge the window still holds both
        let d = store
            .record_and_evaluate(&c, RouteClass::Global, &policy, at(11))
            .unwrap();
        assert!(!d.allowed);
        assert_eq!(d.retry_after, Some(7));

        // Once the first one ages out a slot opens
        let d = store
            .record_and_evaluate(&c, RouteClass::Global, &policy, at(19))
            .unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_at, T0 + 19);
    }

    #[test]
    fn test_reset_uses_oldest_when_populated() {
        let store = SlidingWindowStore::new();
        let policy = policy(5, 60);
        let c = client("C");

        store.record_and_evaluate(&c, RouteClass::Chat, &policy, at(0)).unwrap();
        let d = store
            .record_and_evaluate(&c, RouteClass::Chat, &policy, at(30))
            .unwrap();
        assert_eq!(d.reset_at, T0 + 60);
        assert_eq!(d.remaining, 3);
    }

    #[test]
    fn test_retry_after_zero_at_window_edge() {
        let store = SlidingWindowStore::new();
        let policy = policy(1, 10);
        let c = client("C");

        store.record_and_evaluate(&c, RouteClass::Global, &policy, at(0)).unwrap();
        // The timestamp at t=0 sits exactly on the cutoff and is retained
        let d = store
            .record_and_evaluate(&c, RouteClass::Global, &policy, at(10))
            .unwrap();
        assert!(!d.allowed);
        assert_eq!(d.retry_after, Some(0));
    }

    #[test]
    fn test_clients_and_classes_are_independent() {
        let store = SlidingWindowStore::new();
        let policy = policy(1, 60);

        assert!(store.record_and_evaluate(&client("a"), RouteClass::Global, &policy, at(0)).unwrap().allowed);
        assert!(!store.record_and_evaluate(&client("a"), RouteClass::Global, &policy, at(1)).unwrap().allowed);
        assert!(store.record_and_evaluate(&client("b"), RouteClass::Global, &policy, at(1)).unwrap().allowed);
        assert!(store.record_and_evaluate(&client("a"), RouteClass::Chat, &policy, at(1)).unwrap().allowed);

        assert_eq!(store.record_count(), 3);
    }

    #[test]
    fn test_invalid_policy_is_a_store_fault() {
        let store = SlidingWindowStore::new();
        let bogus = PolicyEntry {
            request_limit: 0,
            window_seconds: 10,
        };

        let result = store.record_and_evaluate(&client("a"), RouteClass::Global, &bogus, at(0));
        assert!(matches!(result, Err(EventgateError::Store(_))));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_overflowing_window_is_a_store_fault() {
        let store = SlidingWindowStore::new();
        let huge = policy(1, u64::MAX);
        let c = client("a");

        let result = store.record_and_evaluate(&c, RouteClass::Global, &huge, at(0));
        assert!(matches!(result, Err(EventgateError::Store(_))));
        assert_eq!(store.timestamp_count(&c, RouteClass::Global), Some(0));

        // The largest window that still fits is evaluated normally
        let max_fit = u64::MAX - (T0 + 1);
        let d = store
            .record_and_evaluate(&c, RouteClass::Chat, &policy(1, max_fit), at(0))
            .unwrap();
        assert!(d.allowed);
        assert_eq!(d.reset_at, u64::MAX - 1);
    }

    #[test]
    fn test_cleanup_reclaims_empty_records() {
        let store = SlidingWindowStore::new();
        let short = policy(10, 5);
        let long = policy(10, 100);

        store.record_and_evaluate(&client("a"), RouteClass::Global, &short, at(0)).unwrap();
        store.record_and_evaluate(&client("b"), RouteClass::Global, &long, at(0)).unwrap();
        store.record_and_evaluate(&client("c"), RouteClass::Chat, &short, at(8)).unwrap();

        assert_eq!(store.cleanup(at(10)), 1);
        assert_eq!(store.record_count(), 2);
        assert_eq!(store.timestamp_count(&client("a"), RouteClass::Global), None);

        assert_eq!(store.cleanup(at(200)), 2);
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_clear() {
        let store = SlidingWindowStore::new();
        store
            .record_and_evaluate(&client("a"), RouteClass::Global, &policy(1, 1), at(0))
            .unwrap();
        store.clear();
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_concurrent_requests_never_exceed_limit() {
        let store = Arc::new(SlidingWindowStore::new());
        let policy = policy(25, 60);
        let admitted = Arc::new(AtomicU32::new(0));
        let c = client("203.0.113.9");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                let admitted = Arc::clone(&admitted);
                let c = c.clone();
                scope.spawn(move || {
                    for i in 0..20 {
                        let d = store
                            .record_and_evaluate(&c, RouteClass::Global, &policy, at(i % 3))
                            .unwrap();
                        if d.allowed {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 25);
        assert_eq!(store.timestamp_count(&c, RouteClass::Global), Some(25));
    }
}
