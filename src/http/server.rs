//! HTTP server implementation.

use axum::http::HeaderValue;
use axum::middleware;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info};

use super::middleware::{process_time, rate_limit, RateLimitState};
use super::routes::{routes, AppState};
use crate::error::{EventgateError, Result};
use crate::ratelimit::{RateLimitPolicy, RateLimiter, RateLimiterBackend};

/// Wrap a router with the rate limit layer and the process-time layer.
///
/// The process-time layer is outermost so rejected requests are timed too.
pub fn with_rate_limiting(
    router: Router,
    policy: Arc<RateLimitPolicy>,
    backend: Arc<dyn RateLimiterBackend>,
) -> Router {
    router
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(policy, backend),
            rate_limit,
        ))
        .layer(middleware::from_fn(process_time))
}

/// CORS policy for browser clients.
///
/// Credentials are allowed, so methods and headers are mirrored from the
/// preflight instead of answered with a wildcard. A `*` entry mirrors any
/// origin.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).map_err(|e| {
                    EventgateError::Config(format!("invalid CORS origin {:?}: {}", o, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

/// Build the full application: host routes behind the rate limiter, with
/// CORS outermost so preflights are answered before any quota is consumed.
pub fn build_app(
    policy: Arc<RateLimitPolicy>,
    limiter: Arc<RateLimiter>,
    cors: CorsLayer,
) -> Router {
    let state = AppState::new(policy.clone(), limiter.clone());
    with_rate_limiting(routes(state), policy, limiter).layer(cors)
}

/// HTTP server for the gateway.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The fully layered application
    app: Router,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, app: Router) -> Self {
        Self { addr, app }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %self.addr, "Starting HTTP server");

        // Peer addresses feed client identification
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitingConfig, ServerConfig};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn cors() -> CorsLayer {
        cors_layer(&ServerConfig::default().cors_origins).unwrap()
    }

    fn app(config: RateLimitingConfig) -> Router {
        let policy = Arc::new(RateLimitPolicy::from_config(&config).unwrap());
        build_app(policy, Arc::new(RateLimiter::new()), cors())
    }

    fn request(method: Method, path: &str) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        let policy = Arc::new(RateLimitPolicy::from_config(&RateLimitingConfig::default()).unwrap());
        let app = build_app(policy, Arc::new(RateLimiter::new()), cors());
        let _server = HttpServer::new(addr, app);
    }

    #[tokio::test]
    async fn test_introspection_is_exempt() {
        let app = app(RateLimitingConfig {
            requests: 1,
            ..RateLimitingConfig::default()
        });

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/api/v1/agents/rate-limits"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
            assert!(response.headers().get("x-process-time").is_some());
        }
    }

    #[tokio::test]
    async fn test_status_is_limited_by_global_policy() {
        let app = app(RateLimitingConfig {
            requests: 2,
            window: 60,
            ..RateLimitingConfig::default()
        });

        for remaining in ["1", "0"] {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/api/v1/agents/status"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
        }

        let response = app
            .oneshot(request(Method::GET, "/api/v1/agents/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get("retry-after").is_some());
        assert!(response.headers().get("x-process-time").is_some());
    }

    #[tokio::test]
    async fn test_chat_uses_chat_policy() {
        let app = app(RateLimitingConfig {
            chat_requests: 1,
            chat_window: 300,
            ..RateLimitingConfig::default()
        });

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/v1/agents/chat"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(response.headers()["x-ratelimit-window"], "300");

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/v1/agents/chat"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app
            .oneshot(request(Method::OPTIONS, "/api/v1/agents/chat"))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    fn with_origin(mut request: Request<Body>, origin: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert("origin", origin.parse().unwrap());
        request
    }

    #[tokio::test]
    async fn test_cors_preflight_answered_without_quota() {
        let app = app(RateLimitingConfig {
            chat_requests: 1,
            ..RateLimitingConfig::default()
        });

        for _ in 0..3 {
            let mut preflight = with_origin(
                request(Method::OPTIONS, "/api/v1/agents/chat"),
                "http://localhost:3000",
            );
            preflight
                .headers_mut()
                .insert("access-control-request-method", "POST".parse().unwrap());

            let response = app.clone().oneshot(preflight).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()["access-control-allow-origin"],
                "http://localhost:3000"
            );
            assert_eq!(response.headers()["access-control-allow-credentials"], "true");
            assert!(!response
                .headers()
                .keys()
                .any(|k| k.as_str().starts_with("x-ratelimit")));
        }

        // The chat quota is still untouched
        let response = app
            .oneshot(with_origin(
                request(Method::POST, "/api/v1/agents/chat"),
                "http://localhost:3000",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_cors_unknown_origin_not_allowed() {
        let app = app(RateLimitingConfig::default());
        let response = app
            .oneshot(with_origin(
                request(Method::GET, "/api/v1/agents/status"),
                "https://elsewhere.example.com",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("access-control-allow-origin").is_none());
        assert!(response.headers().get("x-ratelimit-limit").is_some());
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&["*".to_string()]).is_ok());
        assert!(matches!(
            cors_layer(&["http://bad\norigin".to_string()]),
            Err(EventgateError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_passes_everything() {
        let app = app(RateLimitingConfig {
            enabled: false,
            requests: 1,
            ..RateLimitingConfig::default()
        });

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/api/v1/agents/status"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let policy = Arc::new(RateLimitPolicy::from_config(&RateLimitingConfig::default()).unwrap());
        let server = HttpServer::new(
            "127.0.0.1:0".parse().unwrap(),
            build_app(policy, Arc::new(RateLimiter::new()), cors()),
        );

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async {
            let _ = rx.await;
        }));
        let _ = tx.send(());

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
