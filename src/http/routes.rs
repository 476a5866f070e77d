//! HTTP route definitions

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::snapshot::match_view;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::MatchView;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    let api_routes = Router::new()
        .route("/queue/status", get(queue_status_handler))
        .route("/matches/:match_id", get(match_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(10)));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api/game", api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured origins (comma separated, `*` for any)
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    cors.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    live_matches: usize,
    active_matches: usize,
    active_players: usize,
    connections: usize,
    queue_size: usize,
    tick_rate_hz: u32,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        live_matches: state.directory.len(),
        active_matches: state.directory.active_matches(),
        active_players: state.directory.total_players(),
        connections: state.connections.len(),
        queue_size: state.matchmaking.queue_size(),
        tick_rate_hz: state.config.tick_rate_hz,
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

#[derive(Deserialize)]
struct QueueStatusQuery {
    player_id: Uuid,
}

#[derive(Serialize)]
struct QueueStatusResponse {
    queued: bool,
    position: Option<usize>,
    waiting_count: usize,
    match_id: Option<Uuid>,
    /// A dropped match is waiting for this player to reconnect
    reconnectable: bool,
}

async fn queue_status_handler(
    State(state): State<AppState>,
    Query(query): Query<QueueStatusQuery>,
) -> Json<QueueStatusResponse> {
    let status = state.matchmaking.status_of(&query.player_id);

    Json(QueueStatusResponse {
        queued: status.position.is_some(),
        position: status.position,
        waiting_count: status.waiting_count,
        match_id: state.directory.match_id_for_player(&query.player_id),
        reconnectable: state.directory.is_disconnected(&query.player_id),
    })
}

async fn match_handler(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchView>, AppError> {
    state
        .directory
        .get_match(&match_id)
        .map(|game| Json(match_view(&game)))
        .ok_or_else(|| AppError::NotFound(format!("match {}", match_id)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
