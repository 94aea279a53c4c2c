//! Error types for the Eventgate service.

use thiserror::Error;

use crate::ratelimit::ClockError;

/// Main error type for Eventgate operations.
#[derive(Error, Debug)]
pub enum EventgateError {
    /// Configuration-related errors, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal rate limit store faults
    #[error("Rate limit store error: {0}")]
    Store(String),

    /// Clock read failures while evaluating a request
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Eventgate operations.
pub type Result<T> = std::result::Result<T, EventgateError>;
