//! Time sources for the rate limiter.
//!
//! Timestamps are expressed as a [`Duration`] since the Unix epoch so that
//! window arithmetic and the `X-RateLimit-Reset` header share one unit.

use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors produced when reading a clock.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// The system clock reports a time before the Unix epoch.
    #[error("system time is before the Unix epoch")]
    BeforeEpoch,
    /// The clock was deliberately put into a failing state.
    #[error("clock unavailable")]
    Unavailable,
}

/// Abstraction over "now", shared by the limiter and the cleanup sweep.
pub trait Clock: Send + Sync {
    /// Current time as a duration since the Unix epoch.
    fn now(&self) -> Result<Duration, ClockError>;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Duration, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::BeforeEpoch)
    }
}

/// A clock that only moves when told to.
///
/// Used by tests to drive the sliding window deterministically.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<Option<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Duration) -> Self {
        Self {
            state: Mutex::new(Some(start)),
        }
    }

    /// Create a clock frozen at `secs` seconds after the epoch.
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        if let Some(now) = state.as_mut() {
            *now += by;
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        *self.state.lock() = Some(to);
    }

    /// Make every subsequent read fail with [`ClockError::Unavailable`].
    pub fn fail(&self) {
        *self.state.lock() = None;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Duration, ClockError> {
        (*self.state.lock()).ok_or(ClockError::Unavailable)
    }
}
