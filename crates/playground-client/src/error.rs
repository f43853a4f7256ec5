use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("relay unreachable: {0}")]
    Connection(String),

    #[error("session not found")]
    NotFound,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("relay error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("no active session")]
    NoActiveSession,

    #[error("failed to decode relay response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Map a failing relay response onto the client taxonomy
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => ClientError::NotFound,
            StatusCode::BAD_REQUEST => ClientError::Validation(message),
            StatusCode::SERVICE_UNAVAILABLE => ClientError::Connection(message),
            _ => ClientError::Upstream {
                status: status.as_u16(),
                message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
