use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Error::Expired(msg) => (StatusCode::GONE, msg),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::InvalidPayload(msg) => (StatusCode::BAD_GATEWAY, msg),
            Error::Upstream { status, message } => (
                StatusCode::BAD_GATEWAY,
                format!("Assignment service returned {}: {}", status, message),
            ),
            Error::Reqwest(err) => (StatusCode::BAD_GATEWAY, format!("External service error: {}", err)),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Anyhow(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl Error {
    /// Short text suitable for showing to the candidate.
    pub fn user_message(&self) -> String {
        match self {
            Error::Reqwest(err) if err.is_timeout() => {
                "The server took too long to respond. Please try again.".to_string()
            }
            Error::Reqwest(_) => "Could not reach the server. Please try again.".to_string(),
            Error::Upstream { status, .. } if *status >= 500 => {
                "Something went wrong. Please try again later.".to_string()
            }
            Error::Upstream { message, .. } if !message.trim().is_empty() => message.clone(),
            Error::Json(_) | Error::InvalidPayload(_) => {
                "The server sent a response we could not read. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
