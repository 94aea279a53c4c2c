//! Rate limit headers and the 429 response.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::ratelimit::{PolicyEntry, RateLimitDecision};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

/// Short error code carried in every rejection body.
pub const RATE_LIMIT_ERROR: &str = "Rate limit exceeded";
const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please try again later.";

/// Write the four `X-RateLimit-*` headers for a decision.
pub fn apply_rate_limit_headers(
    headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    policy: &PolicyEntry,
) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at));
    headers.insert(X_RATELIMIT_WINDOW, HeaderValue::from(policy.window_seconds));
}

/// JSON body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub details: RateLimitDetails,
}

/// Limit details included in a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDetails {
    pub limit: u32,
    pub window_seconds: u64,
    pub retry_after: u64,
}

/// A terminal 429 response for a rejected decision.
#[derive(Debug, Clone)]
pub struct RateLimitExceeded {
    decision: RateLimitDecision,
    policy: PolicyEntry,
}

impl RateLimitExceeded {
    pub fn new(decision: RateLimitDecision, policy: PolicyEntry) -> Self {
        Self { decision, policy }
    }

    /// Seconds the client should wait. Falls back to the full window if the
    /// decision carries no hint.
    pub fn retry_after(&self) -> u64 {
        self.decision
            .retry_after
            .unwrap_or(self.policy.window_seconds)
    }

    /// The JSON payload.
    pub fn body(&self) -> RateLimitErrorBody {
        RateLimitErrorBody {
            success: false,
            error: RATE_LIMIT_ERROR.to_string(),
            message: RATE_LIMIT_MESSAGE.to_string(),
            details: RateLimitDetails {
                limit: self.policy.request_limit,
                window_seconds: self.policy.window_seconds,
                retry_after: self.retry_after(),
            },
        }
    }
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self.body())).into_response();
        let headers = response.headers_mut();
        apply_rate_limit_headers(headers, &self.decision, &self.policy);
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after()));
        response
    }
}
