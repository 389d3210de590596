use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crowdlens_common::Config;
use crowdlens_engine::{ClaudeEvaluator, HeuristicEvaluator, JobRegistry, PersonaEvaluator};

mod rest;
mod ws;

pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub rate_limiter: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crowdlens=info".parse()?))
        .init();

    let config = Config::from_env();

    let evaluator: Arc<dyn PersonaEvaluator> = if config.anthropic_api_key.is_empty() {
        info!("ANTHROPIC_API_KEY not set, using the offline heuristic evaluator");
        Arc::new(HeuristicEvaluator)
    } else {
        Arc::new(ClaudeEvaluator::new(&config.anthropic_api_key))
    };

    let registry = JobRegistry::new(evaluator, config.max_concurrency);
    registry.spawn_retention_sweep(SWEEP_INTERVAL, Duration::from_secs(config.retention_secs));

    let state = Arc::new(AppState {
        registry,
        rate_limiter: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        // Health check
        .route("/health", get(rest::health))
        // REST API
        .route("/api/simulations", post(rest::simulations::create_simulation))
        .route("/api/simulations/{id}", get(rest::simulations::get_simulation))
        .route(
            "/api/simulations/{id}/status",
            get(rest::simulations::get_status),
        )
        .route(
            "/api/simulations/{id}/results",
            get(rest::simulations::get_results),
        )
        .route(
            "/api/simulations/{id}/cancel",
            post(rest::simulations::cancel_simulation),
        )
        // Streaming
        .route("/ws/simulations/{id}", get(ws::ws_simulation))
        .with_state(state)
        // CORS: the dashboard client is served from another origin
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.host, config.port);
    info!("CrowdLens API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
