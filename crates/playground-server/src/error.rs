use axum::http::StatusCode;
use thiserror::Error;

use crate::agent::AgentError;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Agent not initialized")]
    AgentUnavailable,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Session busy: {0}")]
    AgentBusy(String),

    #[error("{0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            RelayError::AgentUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::AgentBusy(_) => StatusCode::CONFLICT,
            RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AgentError> for RelayError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Busy(session_id) => RelayError::AgentBusy(session_id),
            AgentError::Unavailable(_) => RelayError::AgentUnavailable,
            other => RelayError::Upstream(other.to_string()),
        }
    }
}
