//! Error responses.
//!
//! `401` bodies carry only `{message}` so a client cannot tell which check
//! failed; every other error is an RFC 9457 style problem with `title` and
//! `status` alongside the message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::domain::error::StrategyError;

/// Message of a missing, malformed, or expired bearer token.
pub const INVALID_ACCESS_TOKEN: &str = "missing or invalid access token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(skip)]
    code: StatusCode,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            status: Some(status.as_u16()),
            message: message.into(),
            code: status,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            title: None,
            status: None,
            message: message.into(),
            code: StatusCode::UNAUTHORIZED,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad Request", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "internal error",
        )
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.code
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

impl From<StrategyError> for Problem {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::Unauthorized(message) => {
                tracing::debug!(%message, "Login rejected");
                Self::unauthorized(message)
            }
            StrategyError::InvalidRefreshToken | StrategyError::OutputNoLongerValid => {
                tracing::debug!(error = %err, "Refresh rejected");
                Self::unauthorized(err.to_string())
            }
            StrategyError::BadRequest(message) => Self::bad_request(message),
            StrategyError::PluginNotFound(_) => Self::bad_request(err.to_string()),
            StrategyError::Internal(detail) => {
                tracing::error!(%detail, "Internal error");
                Self::internal()
            }
        }
    }
}
