use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use playground_protocol::ErrorResponse;

use crate::error::RelayError;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        let status = e.to_status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %e, "request failed");
        } else {
            tracing::debug!(status = %status, error = %e, "request rejected");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_status_mapping() {
        let cases = [
            (RelayError::AgentUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                RelayError::SessionNotFound("s1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                RelayError::Validation("prompt is required".into()),
                StatusCode::BAD_REQUEST,
            ),
            (RelayError::AgentBusy("s1".into()), StatusCode::CONFLICT),
            (
                RelayError::Upstream("spawn failed".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status, expected);
        }
    }

    #[test]
    fn test_upstream_message_is_verbatim() {
        let err = ApiError::from(RelayError::Upstream("model quota exceeded".into()));
        assert_eq!(err.message, "model quota exceeded");
    }
}
