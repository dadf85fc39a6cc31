//! Mapping of core failures onto HTTP responses.

use api_shared::{AuthError, MessageRes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use oncobloom_core::{CoreError, OtpError};

/// An error response: a status code and a message that is safe to show the caller.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }

    /// Maps a core error, logging anything the caller is not told about.
    pub fn from_core(context: &str, err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            CoreError::Text(e) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            CoreError::Filter(e) => {
                tracing::error!("{}: {:?}", context, e);
                Self::new(StatusCode::BAD_REQUEST, "Invalid filter")
            }
            CoreError::NotFound(what) => {
                Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            CoreError::Unauthenticated => {
                Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
            }
            CoreError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "Invalid credentials")
            }
            CoreError::Forbidden(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            CoreError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            CoreError::DuplicateIdentifier(id) => {
                tracing::warn!("{}: identifier {} still taken after retries", context, id);
                Self::new(StatusCode::CONFLICT, "Identifier collision, please retry")
            }
            CoreError::Otp(OtpError::NotFound) => {
                Self::new(StatusCode::BAD_REQUEST, "No one-time code is pending")
            }
            CoreError::Otp(OtpError::Expired) => {
                Self::new(StatusCode::GONE, "One-time code has expired")
            }
            CoreError::Otp(OtpError::Mismatch) => {
                Self::new(StatusCode::BAD_REQUEST, "Invalid one-time code")
            }
            e @ (CoreError::PasswordHash(_) | CoreError::Database(_)) => {
                tracing::error!("{}: {:?}", context, e);
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(MessageRes::new(self.message))).into_response()
    }
}
