//! Route classification and per-class rate limit policy.
//!
//! Every request maps to exactly one [`RouteClass`]. Classification walks an
//! ordered list of [`RouteRule`]s and the first matching rule wins; requests
//! matching no rule fall into [`RouteClass::Global`]. Exempt rules are always
//! placed ahead of class-specific rules.

use axum::http::Method;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::RateLimitingConfig;
use crate::error::{EventgateError, Result};

/// Path of the rate limit introspection endpoint. Always exempt.
pub const RATE_LIMITS_PATH: &str = "/api/v1/agents/rate-limits";

/// Classification bucket that decides which policy applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    /// Default limits for all non-exempt traffic
    Global,
    /// Stricter limits for the chat endpoint
    Chat,
    /// Never limited, never annotated
    Exempt,
}

impl RouteClass {
    /// Lowercase name used in logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Global => "global",
            RouteClass::Chat => "chat",
            RouteClass::Exempt => "exempt",
        }
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request limit and window for one route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyEntry {
    /// Maximum requests admitted within the window
    pub request_limit: u32,
    /// Length of the sliding window in seconds
    pub window_seconds: u64,
}

impl PolicyEntry {
    /// Create a validated policy entry.
    ///
    /// Both the limit and the window must be positive.
    pub fn new(request_limit: u32, window_seconds: u64) -> Result<Self> {
        let entry = Self {
            request_limit,
            window_seconds,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Check that the limit and the window are positive.
    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(EventgateError::Config(
                "request limit must be a positive integer".to_string(),
            ));
        }
        if self.window_seconds == 0 {
            return Err(EventgateError::Config(
                "window must be a positive number of seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Predicate half of a classification rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatcher {
    /// Any path requested with this method
    Method(Method),
    /// The path equals this string
    Path(String),
    /// The path is this prefix or lies underneath it
    Prefix(String),
    /// The path contains this fragment anywhere
    Contains(String),
}

impl RouteMatcher {
    /// Whether a request matches this predicate.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        match self {
            RouteMatcher::Method(m) => m == method,
            RouteMatcher::Path(p) => path == p,
            RouteMatcher::Prefix(prefix) => {
                let prefix = prefix.trim_end_matches('/');
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            RouteMatcher::Contains(fragment) => path.contains(fragment.as_str()),
        }
    }
}

/// A (predicate, class) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub matcher: RouteMatcher,
    pub class: RouteClass,
}

impl RouteRule {
    pub fn new(matcher: RouteMatcher, class: RouteClass) -> Self {
        Self { matcher, class }
    }
}

/// The process-wide, immutable rate limit policy.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    enabled: bool,
    global: PolicyEntry,
    chat: PolicyEntry,
    rules: Vec<RouteRule>,
}

impl RateLimitPolicy {
    /// Build a policy from explicit parts.
    pub fn new(
        enabled: bool,
        global: PolicyEntry,
        chat: PolicyEntry,
        rules: Vec<RouteRule>,
    ) -> Result<Self> {
        global.validate()?;
        chat.validate()?;
        Ok(Self {
            enabled,
            global,
            chat,
            rules,
        })
    }

    /// Compile the policy from configuration.
    ///
    /// Rule order: `OPTIONS` for any path, the exempt path list, the static
    /// prefix, then the chat fragment. The introspection path is exempt even
    /// when the configured list leaves it out.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        let global = PolicyEntry::new(config.requests, config.window)
            .map_err(|e| EventgateError::Config(format!("global policy: {}", e)))?;
        let chat = PolicyEntry::new(config.chat_requests, config.chat_window)
            .map_err(|e| EventgateError::Config(format!("chat policy: {}", e)))?;

        let mut rules = vec![RouteRule::new(
            RouteMatcher::Method(Method::OPTIONS),
            RouteClass::Exempt,
        )];
        rules.extend(
            config
                .exempt_paths
                .iter()
                .map(|p| RouteRule::new(RouteMatcher::Path(p.clone()), RouteClass::Exempt)),
        );
        if !config.exempt_paths.iter().any(|p| p == RATE_LIMITS_PATH) {
            rules.push(RouteRule::new(
                RouteMatcher::Path(RATE_LIMITS_PATH.to_string()),
                RouteClass::Exempt,
            ));
        }
        if !config.static_prefix.is_empty() {
            rules.push(RouteRule::new(
                RouteMatcher::Prefix(config.static_prefix.clone()),
                RouteClass::Exempt,
            ));
        }
        if !config.chat_path.is_empty() {
            rules.push(RouteRule::new(
                RouteMatcher::Contains(config.chat_path.clone()),
                RouteClass::Chat,
            ));
        }

        let policy = Self::new(config.enabled, global, chat, rules)?;

        info!(
            enabled = policy.enabled,
            global_limit = global.request_limit,
            global_window_secs = global.window_seconds,
            chat_limit = chat.request_limit,
            chat_window_secs = chat.window_seconds,
            rules = policy.rules.len(),
            "Rate limit policy compiled"
        );

        Ok(policy)
    }

    /// Whether the mechanism is switched on at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Classify a request. The first matching rule wins.
    pub fn classify(&self, method: &Method, path: &str) -> RouteClass {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(method, path))
            .map(|rule| rule.class)
            .unwrap_or(RouteClass::Global)
    }

    /// The policy entry for a class, `None` for [`RouteClass::Exempt`].
    pub fn entry(&self, class: RouteClass) -> Option<PolicyEntry> {
        match class {
            RouteClass::Global => Some(self.global),
            RouteClass::Chat => Some(self.chat),
            RouteClass::Exempt => None,
        }
    }

    /// Global policy entry.
    pub fn global(&self) -> PolicyEntry {
        self.global
    }

    /// Chat policy entry.
    pub fn chat(&self) -> PolicyEntry {
        self.chat
    }

    /// The compiled classification rules, in evaluation order.
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Exact paths that are never limited.
    pub fn exempt_paths(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.class == RouteClass::Exempt)
            .filter_map(|r| match &r.matcher {
                RouteMatcher::Path(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }
}
