//! Shared definitions for the playground relay server and its clients.

pub mod event;
pub mod message;
pub mod projector;

pub use event::{EventKind, RawEvent};
pub use message::{
    Compaction, CompactionStatus, CompactionTokens, DisplayMessage, ToolCall, Usage, UsageFlavor,
};
pub use projector::{project, project_incremental, Change, Conversation};

use serde::{Deserialize, Serialize};

// ============================================================================
// Status
// ============================================================================

/// Public info about a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub model: String,
}

/// GET /api/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub sessions: Vec<SessionInfo>,
}

// ============================================================================
// Sessions
// ============================================================================

/// Custom model provider endpoint for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// POST /api/sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// POST /api/sessions/:id/send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub message_id: String,
}

/// GET /api/sessions/:id/events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub session_id: String,
    pub events: Vec<RawEvent>,
    /// Current length of the session's event log
    #[serde(default)]
    pub total: usize,
}

/// GET /api/sessions/:id/messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub session_id: String,
    pub messages: Vec<RawEvent>,
}

/// DELETE /api/sessions/:id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
