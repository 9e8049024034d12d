mod config;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod rate_limit;
mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config};
use crate::handlers::{get_users, health_handler, metrics_handler, not_found_handler};
use crate::state::AppState;

// how often idle limiter entries are swept out
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = &args.write_default_config {
        if let Err(e) = Config::write_default(path) {
            error!(error = %e, "failed to write default config");
            std::process::exit(1);
        }
        info!(path = %path.display(), "wrote default config");
        return;
    }

    let config = match Config::resolve(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    info!(
        environment = %config.environment,
        port = config.http.listen_port,
        rate_limit = config.throttling.n,
        rate_window_ms = config.throttling.m,
        "configuration loaded"
    );

    metrics::initialize();

    let state = Arc::new(AppState::new(&config));

    // sweep idle limiter entries so the caller map cannot grow without bound
    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            let removed = purge_state.limiter.purge_expired(Instant::now());
            metrics::TRACKED_CALLERS.set(purge_state.limiter.tracked_callers() as f64);
            if removed > 0 {
                debug!(removed, "purged idle limiter entries");
            }
        }
    });

    let app = app(state);

    let addr = format!("0.0.0.0:{}", config.http.listen_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %addr, "server listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server exited");
        std::process::exit(1);
    }
}

// Full router: open endpoints at the top level, the throttled API under
// /v1 behind token validation and the limit check.
fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/users", get(get_users))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::check_limits,
        ))
        .layer(axum::middleware::from_fn(middleware::require_bearer_token));

    Router::new()
        .route("/healthcheck", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/v1", v1)
        .fallback(not_found_handler)
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::track_requests,
        ))
        .layer(cors)
}
