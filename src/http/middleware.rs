//! Axum middleware applying the rate limit policy to every request.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

use super::response::{apply_rate_limit_headers, RateLimitExceeded};
use crate::ratelimit::{ClientKey, RateLimitPolicy, RateLimiterBackend};

/// Header carrying the handler latency in seconds.
pub const X_PROCESS_TIME: &str = "x-process-time";

/// Shared state for [`rate_limit`].
#[derive(Clone)]
pub struct RateLimitState {
    policy: Arc<RateLimitPolicy>,
    backend: Arc<dyn RateLimiterBackend>,
}

impl RateLimitState {
    pub fn new(policy: Arc<RateLimitPolicy>, backend: Arc<dyn RateLimiterBackend>) -> Self {
        Self { policy, backend }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

/// Rate limit every inbound request.
///
/// Disabled policies and exempt routes are forwarded untouched. Admitted
/// requests get `X-RateLimit-*` headers on the downstream response; rejected
/// ones are answered with 429 without reaching the handler. If the backend
/// fails, the request is forwarded as if admitted, without headers.
pub async fn rate_limit(State(state): State<RateLimitState>, request: Request, next: Next) -> Response {
    let policy = state.policy();
    if !policy.is_enabled() {
        return next.run(request).await;
    }

    let class = policy.classify(request.method(), request.uri().path());
    let Some(entry) = policy.entry(class) else {
        trace!(path = %request.uri().path(), method = %request.method(), "Exempt from rate limiting");
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientKey::from_request_parts(request.headers(), peer);

    let decision = match state.backend.check(&client, class, &entry).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(
                client = %client,
                route_class = %class,
                path = %request.uri().path(),
                error = %e,
                "Rate limit evaluation failed, forwarding request"
            );
            return next.run(request).await;
        }
    };

    if !decision.allowed {
        warn!(
            client = %client,
            route_class = %class,
            path = %request.uri().path(),
            limit = decision.limit,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );
        return RateLimitExceeded::new(decision, entry).into_response();
    }

    debug!(
        client = %client,
        route_class = %class,
        remaining = decision.remaining,
        "Request admitted"
    );

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision, &entry);
    response
}

/// Record how long the rest of the stack took to produce a response.
pub async fn process_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64().to_string();
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(X_PROCESS_TIME, value);
    }
    response
}
