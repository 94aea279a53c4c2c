//! HTTP layer: the rate limit middleware, its responses, and the server.

mod middleware;
mod response;
mod routes;
mod server;

pub use middleware::{process_time, rate_limit, RateLimitState, X_PROCESS_TIME};
pub use response::{
    apply_rate_limit_headers, RateLimitDetails, RateLimitErrorBody, RateLimitExceeded,
    RATE_LIMIT_ERROR, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
    X_RATELIMIT_WINDOW,
};
pub use routes::{routes, window_description, AppState, LimitInfo, RateLimitInfo, SuccessResponse};
pub use server::{build_app, cors_layer, with_rate_limiting, HttpServer};
