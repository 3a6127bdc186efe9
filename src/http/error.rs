//! Error responses of the API.
//!
//! Every failure renders as `{"errors":[{"code":..,"message":..}]}`. The
//! code identifies middleware rejections; controller and storage errors
//! carry code 0 and take their status from [`crate::Error::status_code`].

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

/// Error codes of the API.
pub mod codes {
    pub const GENERIC: u16 = 0;
    pub const APP_AUTH: u16 = 1001;
    pub const USER_NOT_FOUND: u16 = 4007;
    pub const USER_SESSION: u16 = 4013;
    pub const USER_AGENT_MISSING: u16 = 5002;
    pub const CONTENT_LENGTH_MISSING: u16 = 5003;
    pub const CONTENT_LENGTH_INVALID: u16 = 5004;
    pub const CONTENT_EMPTY: u16 = 5005;
    pub const CONTENT_TYPE_MISSING: u16 = 5006;
    pub const CONTENT_TYPE_INVALID: u16 = 5007;
    pub const PAYLOAD_TOO_BIG: u16 = 5011;
    pub const PAYLOAD_MALFORMED: u16 = 5012;
}

#[derive(Debug, Serialize)]
struct ErrorItem {
    code: u16,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    errors: Vec<ErrorItem>,
}

/// An error returned to the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: u16, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: u16, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::GENERIC, message)
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "http", error = %err, "request failed");
        }
        Self::new(status, codes::GENERIC, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(target: "http", error = %rejection.body_text(), "malformed payload");
        Self::bad_request(codes::PAYLOAD_MALFORMED, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            errors: vec![ErrorItem {
                code: self.code,
                message: self.message,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

/// Result of a handler.
pub type ApiResult<T> = Result<T, ApiError>;
