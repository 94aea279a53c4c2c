use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventgate::config::{Args, GatewayConfig, LogFormat, ServerConfig};
use eventgate::http::{build_app, cors_layer, HttpServer};
use eventgate::ratelimit::{CleanupTask, RateLimitPolicy, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = GatewayConfig::load(&args).context("Failed to load configuration")?;

    init_tracing(&config.server);

    info!("Starting Eventgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }

    let addr = config.server.bind_addr()?;
    info!(addr = %addr, "Configuration loaded");

    // Compile the rate limit policy; invalid bounds stop startup here
    let policy = Arc::new(
        RateLimitPolicy::from_config(&config.rate_limiting)
            .context("Invalid rate limit configuration")?,
    );

    let limiter = Arc::new(RateLimiter::new());
    let cleanup = CleanupTask::spawn(
        limiter.clone(),
        Duration::from_secs(config.server.cleanup_interval_secs),
    );
    info!("Rate limiter initialized");

    let cors = cors_layer(&config.server.cors_origins).context("Invalid CORS configuration")?;
    info!(origins = ?config.server.cors_origins, "CORS configured");

    let server = HttpServer::new(addr, build_app(policy, limiter, cors));
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    cleanup.shutdown().await;
    result?;

    info!("Eventgate stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match server.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
