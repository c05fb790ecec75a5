use reqwest::StatusCode;
use thiserror::Error;

use super::ResponseBody;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The server answered with no content. Callers usually present this as
    /// "nothing found" rather than a failure.
    #[error("No content")]
    EmptyResult,

    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        payload: ResponseBody,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error messages taken from response bodies
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a server-supplied message to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_response(status: StatusCode, payload: ResponseBody) -> Self {
        let message = payload
            .message()
            .map(|m| Self::truncate_body(&m))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        ApiError::Http {
            status: status.as_u16(),
            message,
            payload,
        }
    }

    /// HTTP status for `Http` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_empty_result(&self) -> bool {
        matches!(self, ApiError::EmptyResult)
    }
}
