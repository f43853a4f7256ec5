use axum::extract::State;
use axum::Json;
use playground_protocol::StatusResponse;
use serde_json::{json, Value};

use crate::Sessions;

/// GET /api - Health check
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// GET /api/status - Agent connectivity and live sessions
pub async fn get_status(State(sessions): State<Sessions>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: sessions.is_connected(),
        sessions: sessions.list().await,
    })
}
