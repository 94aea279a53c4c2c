//! Configuration management for Eventgate.
//!
//! Sources, lowest to highest priority:
//! 1. built-in defaults
//! 2. an optional YAML file (`--config`)
//! 3. environment variables (`API_HOST`, `RATE_LIMIT_REQUESTS`, ...)
//! 4. command-line flags
//!
//! Environment variables and flags are read by the same [`Args`] parser, so
//! a flag always wins over its variable.

use axum::http::HeaderValue;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{EventgateError, Result};
use crate::ratelimit::PolicyEntry;

/// Main configuration for the Eventgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between sweeps that reclaim empty rate limit records
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Log filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Browser origins allowed to call the API; `*` mirrors any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cleanup_interval_secs: default_cleanup_interval(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Master switch; when off every request passes through untouched
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Global requests per window
    #[serde(default = "default_requests")]
    pub requests: u32,

    /// Global window in seconds
    #[serde(default = "default_window")]
    pub window: u64,

    /// Chat requests per window
    #[serde(default = "default_chat_requests")]
    pub chat_requests: u32,

    /// Chat window in seconds
    #[serde(default = "default_chat_window")]
    pub chat_window: u64,

    /// Path fragment identifying chat requests
    #[serde(default = "default_chat_path")]
    pub chat_path: String,

    /// Prefix under which static assets are served
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,

    /// Exact paths that are never limited
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests: default_requests(),
            window: default_window(),
            chat_requests: default_chat_requests(),
            chat_window: default_chat_window(),
            chat_path: default_chat_path(),
            static_prefix: default_static_prefix(),
            exempt_paths: default_exempt_paths(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests() -> u32 {
    100
}

fn default_window() -> u64 {
    3600
}

fn default_chat_requests() -> u32 {
    30
}

fn default_chat_window() -> u64 {
    300
}

fn default_chat_path() -> String {
    "/chat".to_string()
}

fn default_static_prefix() -> String {
    "/static".to_string()
}

fn default_exempt_paths() -> Vec<String> {
    [
        "/",
        "/docs",
        "/redoc",
        "/openapi.json",
        "/health",
        "/api/v1/agents/health",
        "/api/v1/agents/rate-limits",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Command-line arguments. Every flag can also be set through the listed
/// environment variable.
#[derive(Parser, Debug, Default)]
#[command(
    name = "eventgate",
    about = "HTTP edge for the event assistant API",
    long_about = "HTTP edge for the event assistant API with per-client sliding-window rate limiting.\n\nCLI arguments take precedence over environment variables, which take precedence over the configuration file."
)]
pub struct Args {
    /// YAML configuration file
    #[arg(short, long, value_name = "PATH", env = "EVENTGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, value_name = "HOST", env = "API_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT", env = "API_PORT")]
    pub port: Option<u16>,

    /// Log filter directive
    #[arg(long, value_name = "LEVEL", env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Comma-separated list of allowed CORS origins
    #[arg(long, value_name = "ORIGINS", env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable or disable rate limiting
    #[arg(
        long,
        value_name = "BOOL",
        env = "RATE_LIMIT_ENABLED",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub rate_limit_enabled: Option<bool>,

    /// Global requests per window
    #[arg(long, value_name = "N", env = "RATE_LIMIT_REQUESTS")]
    pub rate_limit_requests: Option<u32>,

    /// Global window in seconds
    #[arg(long, value_name = "SECS", env = "RATE_LIMIT_WINDOW")]
    pub rate_limit_window: Option<u64>,

    /// Chat requests per window
    #[arg(long, value_name = "N", env = "RATE_LIMIT_CHAT_REQUESTS")]
    pub rate_limit_chat_requests: Option<u32>,

    /// Chat window in seconds
    #[arg(long, value_name = "SECS", env = "RATE_LIMIT_CHAT_WINDOW")]
    pub rate_limit_chat_window: Option<u64>,

    /// Seconds between cleanup sweeps
    #[arg(long, value_name = "SECS", env = "RATE_LIMIT_CLEANUP_INTERVAL")]
    pub cleanup_interval: Option<u64>,
}

impl GatewayConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| EventgateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Build the effective configuration from parsed arguments.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Overlay values supplied on the command line or through the environment.
    pub fn apply_args(&mut self, args: &Args) {
        let server = &mut self.server;
        if let Some(host) = &args.host {
            server.host = host.clone();
        }
        if let Some(port) = args.port {
            server.port = port;
        }
        if let Some(level) = &args.log_level {
            server.log_level = level.clone();
        }
        if let Some(format) = args.log_format {
            server.log_format = format;
        }
        if let Some(interval) = args.cleanup_interval {
            server.cleanup_interval_secs = interval;
        }
        if let Some(origins) = &args.cors_origins {
            server.cors_origins = origins
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        let limits = &mut self.rate_limiting;
        if let Some(enabled) = args.rate_limit_enabled {
            limits.enabled = enabled;
        }
        if let Some(requests) = args.rate_limit_requests {
            limits.requests = requests;
        }
        if let Some(window) = args.rate_limit_window {
            limits.window = window;
        }
        if let Some(requests) = args.rate_limit_chat_requests {
            limits.chat_requests = requests;
        }
        if let Some(window) = args.rate_limit_chat_window {
            limits.chat_window = window;
        }
    }

    /// Reject nonsensical bounds before anything starts serving.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.rate_limiting;
        PolicyEntry::new(limits.requests, limits.window)
            .map_err(|e| EventgateError::Config(format!("global limits: {}", e)))?;
        PolicyEntry::new(limits.chat_requests, limits.chat_window)
            .map_err(|e| EventgateError::Config(format!("chat limits: {}", e)))?;

        if self.server.cleanup_interval_secs == 0 {
            return Err(EventgateError::Config(
                "cleanup interval must be a positive number of seconds".to_string(),
            ));
        }

        for origin in &self.server.cors_origins {
            HeaderValue::from_str(origin).map_err(|e| {
                EventgateError::Config(format!("invalid CORS origin {:?}: {}", origin, e))
            })?;
        }

        self.server.bind_addr().map(|_| ())
    }
}

impl ServerConfig {
    /// The socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| EventgateError::Config(format!("invalid bind address {}:{}: {}", self.host, self.port, e)))
    }
}
