use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a plant document could not be read from the remote store.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not signed in, or the ID token has expired")]
    Unauthorized,

    #[error("Plant document is not readable by this owner: {0}")]
    AccessDenied(String),

    #[error("No plant document at {0}")]
    NotFound(String),

    #[error("Remote store kept rate limiting after retries")]
    RateLimited,

    #[error("Remote store failed with {status}: {body}")]
    ServerError { status: StatusCode, body: String },

    #[error("Could not reach the remote store: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unreadable plant document: {0}")]
    InvalidResponse(String),

    #[error("No plant document within {0:?}")]
    Timeout(Duration),

    #[error("Bad remote store URL: {0}")]
    InvalidUrl(String),
}

/// Bodies of failed responses are cut to this many bytes before they end up in an error.
const MAX_ERROR_BODY_LENGTH: usize = 500;

fn excerpt(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
}

impl ApiError {
    /// Map a non-success response for `path` onto an error.
    pub fn from_response(status: StatusCode, path: &str, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::AccessDenied(excerpt(body)),
            StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            s if s.is_server_error() => ApiError::ServerError {
                status: s,
                body: excerpt(body),
            },
            s => ApiError::InvalidResponse(format!("unexpected status {}: {}", s, excerpt(body))),
        }
    }

    /// Returns `true` if the same fetch could succeed later without changes
    /// on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited
                | ApiError::ServerError { .. }
                | ApiError::NetworkError(_)
                | ApiError::Timeout(_)
        )
    }
}
