//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The engine speaks WebSocket frames at `/api/ws`. The AI endpoint is also
//! exposed over plain HTTP for non-WS callers, mirroring how rendering
//! clients invoke it directly.

pub mod ws;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::ai::AiAction;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/ai", post(run_ai))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AiRequest {
    action: String,
    #[serde(default)]
    notes: Vec<AiNote>,
}

#[derive(Debug, Deserialize)]
struct AiNote {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct AiResponse {
    result: String,
}

async fn run_ai(
    State(state): State<AppState>,
    Json(req): Json<AiRequest>,
) -> Result<Json<AiResponse>, (StatusCode, String)> {
    let Some(action) = AiAction::parse(&req.action) else {
        return Err((StatusCode::BAD_REQUEST, format!("unknown action: {}", req.action)));
    };
    let texts: Vec<String> = req.notes.into_iter().map(|n| n.text).collect();
    let result = state.ai.run(action, &texts).await;
    Ok(Json(AiResponse { result }))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "ws_session_test.rs"]
mod session_tests;
