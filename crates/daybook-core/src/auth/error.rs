use thiserror::Error;

use crate::api::{ApiError, ResponseBody};

/// Failure of the shared refresh operation.
///
/// Clone so every caller joined on one in-flight refresh receives the same
/// outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Which credential-issuing endpoint was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Register,
}

impl AuthAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthAction::Login => "login",
            AuthAction::Register => "register",
        }
    }

    fn failure_label(self) -> &'static str {
        match self {
            AuthAction::Login => "Login failed",
            AuthAction::Register => "Register failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Bad request, please check your input")]
    BadRequest,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Access denied")]
    AccessDenied,

    #[error("We can't find this user")]
    UserNotFound,

    #[error("User already exists")]
    AccountExists,

    #[error("Server error, please try again later")]
    ServerError,

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    pub fn from_status(action: AuthAction, status: u16, body: &ResponseBody) -> Self {
        match (status, action) {
            (400, _) => AuthError::BadRequest,
            (401, _) => AuthError::InvalidCredentials,
            (403, _) => AuthError::AccessDenied,
            (404, AuthAction::Login) => AuthError::UserNotFound,
            (409, AuthAction::Register) => AuthError::AccountExists,
            (500, _) => AuthError::ServerError,
            _ => AuthError::Rejected {
                status,
                message: body
                    .message()
                    .unwrap_or_else(|| format!("{} ({})", action.failure_label(), status)),
            },
        }
    }
}
