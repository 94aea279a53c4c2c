//! Rate limiting logic and state management.

mod backend;
mod cleanup;
mod client;
mod clock;
mod limiter;
mod rules;
mod store;
mod window;

pub use backend::RateLimiterBackend;
pub use cleanup::CleanupTask;
pub use client::{ClientKey, UNKNOWN_CLIENT, X_FORWARDED_FOR, X_REAL_IP};
pub use clock::{Clock, ClockError, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use rules::{
    PolicyEntry, RateLimitPolicy, RouteClass, RouteMatcher, RouteRule, RATE_LIMITS_PATH,
};
pub use store::{RateLimitDecision, RecordKey, SlidingWindowStore};
pub use window::WindowRecord;
