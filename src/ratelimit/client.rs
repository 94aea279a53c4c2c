//! Client key resolution.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Header set by reverse proxies with the original client chain.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Header set by some proxies with the single original client address.
pub const X_REAL_IP: &str = "x-real-ip";

/// Key used when neither headers nor the peer address identify the caller.
///
/// All such callers share one quota.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// A best-effort identifier for the origin of a request.
///
/// Usually an IP address, but any non-empty string is accepted; the value is
/// never parsed or validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from an arbitrary string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Resolve the key for a request.
    ///
    /// Resolution order, first present wins:
    /// 1. the first entry of `X-Forwarded-For`, trimmed
    /// 2. `X-Real-IP`
    /// 3. the transport peer address
    ///
    /// Falls back to [`UNKNOWN_CLIENT`] when none of these is available.
    pub fn from_request_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR) {
            let first = forwarded.split(',').next().unwrap_or_default().trim();
            if !first.is_empty() {
                return Self::new(first);
            }
        }

        if let Some(real_ip) = header_str(headers, X_REAL_IP) {
            let real_ip = real_ip.trim();
            if !real_ip.is_empty() {
                return Self::new(real_ip);
            }
        }

        match peer {
            Some(addr) => Self::new(addr.ip().to_string()),
            None => Self::new(UNKNOWN_CLIENT),
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
