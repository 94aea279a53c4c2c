//! Rate limiter trait used by the HTTP middleware.

use async_trait::async_trait;

use super::client::ClientKey;
use super::rules::{PolicyEntry, RouteClass};
use super::store::RateLimitDecision;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The middleware only talks to this trait, so the in-process
/// [`RateLimiter`](super::RateLimiter) can later be swapped for a backend
/// backed by a shared store without touching the request path.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Evaluate one request for `client` in `class` and record it if admitted.
    ///
    /// An `Err` is an internal fault, never a rejection; rejections are
    /// `Ok` decisions with `allowed == false`.
    async fn check(
        &self,
        client: &ClientKey,
        class: RouteClass,
        policy: &PolicyEntry,
    ) -> Result<RateLimitDecision>;
}
