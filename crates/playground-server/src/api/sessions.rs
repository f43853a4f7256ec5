use axum::extract::{Path, Query, State};
use axum::Json;
use playground_protocol::{
    CreateSessionRequest, CreateSessionResponse, DeleteResponse, EventsResponse, MessagesResponse,
    SendRequest, SendResponse,
};
use serde::Deserialize;

use crate::agent::SessionConfig;
use crate::api::error::ApiError;
use crate::error::RelayError;
use crate::Sessions;

// ============================================================================
// Create session
// ============================================================================

/// POST /api/sessions - Create a new agent session
pub async fn create_session(
    State(sessions): State<Sessions>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let model = req.model.trim();
    if model.is_empty() {
        return Err(RelayError::Validation("model is required".into()).into());
    }

    let config = SessionConfig {
        model: model.to_string(),
        system_message: req.system_message.filter(|m| !m.trim().is_empty()),
        provider: req.provider,
    };

    let session_id = sessions.create(config).await?;
    Ok(Json(CreateSessionResponse { session_id }))
}

// ============================================================================
// Send message
// ============================================================================

/// POST /api/sessions/:id/send - Forward a prompt to the agent
pub async fn send_message(
    State(sessions): State<Sessions>,
    Path(session_id): Path<String>,
    body: Option<Json<SendRequest>>,
) -> Result<Json<SendResponse>, ApiError> {
    sessions.get(&session_id).await?;

    let prompt = body
        .and_then(|Json(req)| req.prompt)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| RelayError::Validation("prompt is required".into()))?;

    let message_id = sessions.send(&session_id, &prompt).await?;
    Ok(Json(SendResponse { message_id }))
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Skip events already seen by the caller
    #[serde(default)]
    pub from: usize,
}

/// GET /api/sessions/:id/events - Event log suffix starting at `from`
pub async fn get_events(
    State(sessions): State<Sessions>,
    Path(session_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let (events, total) = sessions.read(&session_id, query.from).await?;
    Ok(Json(EventsResponse {
        session_id,
        events,
        total,
    }))
}

/// GET /api/sessions/:id/messages - Full retained history
pub async fn get_messages(
    State(sessions): State<Sessions>,
    Path(session_id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let messages = sessions.history(&session_id).await?;
    Ok(Json(MessagesResponse {
        session_id,
        messages,
    }))
}

// ============================================================================
// Destroy session
// ============================================================================

/// DELETE /api/sessions/:id - Destroy a session
pub async fn delete_session(
    State(sessions): State<Sessions>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    sessions.destroy(&session_id).await?;
    Ok(Json(DeleteResponse { success: true }))
}
