use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crowdlens_common::{Article, ArticleMetadata, CrowdLensError, SimulationConfig};

use crate::AppState;

#[derive(Deserialize)]
pub struct CreateSimulationRequest {
    article_content: String,
    #[serde(default)]
    article_metadata: ArticleMetadata,
    #[serde(default)]
    config: Option<SimulationConfig>,
}

pub const RATE_LIMIT_PER_HOUR: usize = 20;

/// Check rate limit for an IP. Returns true if the request is allowed.
/// Prunes expired entries and records the new request if allowed.
pub fn check_rate_limit(entries: &mut Vec<Instant>, now: Instant, max_per_hour: usize) -> bool {
    let cutoff = now - std::time::Duration::from_secs(3600);
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_per_hour {
        return false;
    }
    entries.push(now);
    true
}

/// Prune empty entries from the rate limiter HashMap to keep it bounded.
pub fn prune_empty_entries(
    limiter: &mut std::collections::HashMap<std::net::IpAddr, Vec<Instant>>,
) {
    let cutoff = Instant::now() - std::time::Duration::from_secs(3600);
    limiter.retain(|_, entries| {
        entries.retain(|t| *t > cutoff);
        !entries.is_empty()
    });
}

pub async fn create_simulation(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    Json(body): Json<CreateSimulationRequest>,
) -> Response {
    // Rate limit submissions per IP; reads are unmetered.
    let ip = addr.ip();
    {
        let mut limiter = state.rate_limiter.lock().await;
        if limiter.len() > 1000 {
            prune_empty_entries(&mut limiter);
        }
        let entries = limiter.entry(ip).or_default();
        if !check_rate_limit(entries, Instant::now(), RATE_LIMIT_PER_HOUR) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Rate limit exceeded: max 20 submissions per hour"
                })),
            )
                .into_response();
        }
    }

    let article = Article {
        content: body.article_content,
        metadata: body.article_metadata,
    };
    let config = body.config.unwrap_or_default();

    match state.registry.submit(article, config) {
        Ok(id) => match state.registry.get(id) {
            Ok(snapshot) => (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "id": id,
                    "status": snapshot.status,
                    "progress": snapshot.progress,
                    "created_at": snapshot.created_at,
                    "updated_at": snapshot.updated_at,
                })),
            )
                .into_response(),
            Err(e) => internal_error(e),
        },
        Err(CrowdLensError::InvalidConfig(message)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn get_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.get(id) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(_) => not_found(id),
    }
}

pub async fn get_status(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.registry.get(id) {
        Ok(snapshot) => Json(serde_json::json!({
            "id": id,
            "status": snapshot.status,
            "progress": snapshot.progress,
            "created_at": snapshot.created_at,
            "updated_at": snapshot.updated_at,
            "error": snapshot.error,
        }))
        .into_response(),
        Err(_) => not_found(id),
    }
}

pub async fn get_results(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.registry.get(id) {
        Ok(snapshot) => match snapshot.result {
            // Completed results, or the partial result of a cancelled job.
            Some(result) => Json(serde_json::json!({
                "id": id,
                "result": result,
                "completed_at": snapshot.updated_at,
            }))
            .into_response(),
            None => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "error": format!("Simulation {id} is not ready"),
                    "status": snapshot.status,
                })),
            )
                .into_response(),
        },
        Err(_) => not_found(id),
    }
}

pub async fn cancel_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.cancel(id) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "id": id, "status": "cancelling" })),
        )
            .into_response(),
        Err(_) => not_found(id),
    }
}

fn not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("Simulation {id} not found") })),
    )
        .into_response()
}

fn internal_error(e: CrowdLensError) -> Response {
    warn!(error = %e, "Internal error handling simulation request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}
