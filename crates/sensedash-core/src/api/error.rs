use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkFailure(String),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Server error: {status} {status_text}")]
    ServerError { status: u16, status_text: String },

    #[error("Invalid response: {0}")]
    MalformedResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::SessionExpired,
            _ => ApiError::ServerError {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            },
        }
    }

    /// Whether this failure tore down the session
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}
