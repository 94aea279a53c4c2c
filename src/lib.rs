//! Eventgate - HTTP edge for the event assistant API
//!
//! This crate fronts the event assistant's HTTP API with a per-client
//! sliding-window rate limiter. Requests are classified into route classes,
//! each with its own limit and window, and admitted requests carry
//! standard `X-RateLimit-*` headers.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
