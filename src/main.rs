use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use turnstile::audit::{AuditSink, TracingAuditLog};
use turnstile::config::TurnstileConfig;
use turnstile::middleware::{rate_limit, RateLimitGuard};
use turnstile::ratelimit::{presets, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration from TURNSTILE_CONFIG if set, defaults otherwise
    let config = match std::env::var("TURNSTILE_CONFIG") {
        Ok(path) => TurnstileConfig::from_file(&path)?,
        Err(_) => TurnstileConfig::default(),
    };
    info!(bind_addr = %config.server.bind_addr, "Configuration loaded");

    // Initialize the shared rate limiter and audit log
    let limiter = Arc::new(RateLimiter::with_store(
        config.store.capacity,
        config.entry_ttl_ms(),
    ));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditLog::new());
    info!(
        capacity = config.store.capacity,
        entry_ttl_secs = config.store.entry_ttl_secs,
        "Rate limiter initialized"
    );

    let app = demo_router(&config, limiter, audit);

    info!("Starting HTTP server on {}", config.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;

    // Run the server with graceful shutdown on Ctrl+C
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

/// A small router demonstrating both sensitivity classes.
fn demo_router(
    config: &TurnstileConfig,
    limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
) -> Router {
    let auth_guard = RateLimitGuard::new(
        Arc::clone(&limiter),
        Arc::clone(&audit),
        config.policy("auth").unwrap_or(presets::AUTH),
    )
    .with_endpoint("auth");

    let api_guard = RateLimitGuard::new(
        limiter,
        audit,
        config.policy("api").unwrap_or(presets::API),
    );

    let auth_routes = Router::new()
        .route("/login", post(login))
        .layer(axum::middleware::from_fn_with_state(auth_guard, rate_limit));

    let api_routes = Router::new()
        .route("/status", get(status))
        .layer(axum::middleware::from_fn_with_state(api_guard, rate_limit));

    auth_routes.merge(api_routes)
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn login() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "authenticated": false }))
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
