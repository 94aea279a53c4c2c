//! Host endpoints served alongside the rate limiter.
//!
//! The agent itself lives elsewhere; these routes cover the welcome page,
//! health checks, service status and rate limit introspection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::ratelimit::{PolicyEntry, RateLimitPolicy, RateLimiter, RATE_LIMITS_PATH};

pub const AGENTS_PREFIX: &str = "/api/v1/agents";

/// State shared by the host handlers.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<RateLimitPolicy>,
    pub limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(policy: Arc<RateLimitPolicy>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            policy,
            limiter,
            started_at: Instant::now(),
        }
    }
}

/// Standard success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// One policy as reported by the introspection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitInfo {
    pub requests: u32,
    pub window_seconds: u64,
    pub window_description: String,
}

impl From<PolicyEntry> for LimitInfo {
    fn from(entry: PolicyEntry) -> Self {
        Self {
            requests: entry.request_limit,
            window_seconds: entry.window_seconds,
            window_description: window_description(entry.window_seconds),
        }
    }
}

/// Payload of the introspection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub enabled: bool,
    pub global_limits: LimitInfo,
    pub chat_limits: LimitInfo,
    pub exempted_paths: Vec<String>,
}

impl RateLimitInfo {
    pub fn from_policy(policy: &RateLimitPolicy) -> Self {
        Self {
            enabled: policy.is_enabled(),
            global_limits: policy.global().into(),
            chat_limits: policy.chat().into(),
            exempted_paths: policy.exempt_paths().into_iter().map(String::from).collect(),
        }
    }
}

/// Render a window length for humans, using the largest whole unit.
pub fn window_description(seconds: u64) -> String {
    let (value, unit) = if seconds % 3600 == 0 {
        (seconds / 3600, "hour")
    } else if seconds % 60 == 0 {
        (seconds / 60, "minute")
    } else {
        (seconds, "second")
    };

    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Build the host router. The rate limit layer is applied by the caller.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(&format!("{}/health", AGENTS_PREFIX), get(health))
        .route(&format!("{}/status", AGENTS_PREFIX), get(status))
        .route(RATE_LIMITS_PATH, get(rate_limits))
        .route(&format!("{}/chat", AGENTS_PREFIX), post(chat))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the event assistant API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": format!("{}/health", AGENTS_PREFIX),
        "rate_limits": format!("{}/rate-limits", AGENTS_PREFIX),
    }))
}

async fn health() -> Json<SuccessResponse<serde_json::Value>> {
    Json(SuccessResponse::new(
        "Service is healthy",
        serde_json::json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn status(State(state): State<AppState>) -> Json<SuccessResponse<serde_json::Value>> {
    Json(SuccessResponse::new(
        "Service status retrieved",
        serde_json::json!({
            "status": "running",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "rate_limiting_enabled": state.policy.is_enabled(),
            "tracked_clients": state.limiter.record_count(),
        }),
    ))
}

async fn rate_limits(State(state): State<AppState>) -> Json<SuccessResponse<RateLimitInfo>> {
    Json(SuccessResponse::new(
        "Rate limit configuration retrieved",
        RateLimitInfo::from_policy(&state.policy),
    ))
}

async fn chat() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "success": false,
            "error": "Not implemented",
            "message": "The agent backend is not attached to this gateway.",
        })),
    )
        .into_response()
}
