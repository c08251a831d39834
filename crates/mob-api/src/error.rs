//! API error types and JSON error response formatting.
//!
//! Every failure leaves the server as `{error, message}` with a status code
//! chosen from the failure's classification. Failures that happen once a
//! handler is known also carry the execution `status`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use mob_action::{ConfigError, DispatchError, FailureKind, OutcomeStatus};
use mob_chat::ChatError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "unknown_action").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Terminal execution status, for failures past handler lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OutcomeStatus>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - unreadable body or empty message.
    BadRequest(String),
    /// 413 Payload Too Large - body over the global limit.
    PayloadTooLarge(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 503 Service Unavailable - component switched off.
    ServiceUnavailable(String),
    /// A classified dispatch failure.
    Dispatch(DispatchError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Dispatch(err) => dispatch_status(err.kind),
        }
    }
}

/// Status code for each dispatch failure kind.
pub fn dispatch_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::UnknownAction => StatusCode::NOT_FOUND,
        FailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
        FailureKind::InvalidInput => StatusCode::BAD_REQUEST,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::ConfigNotFound
        | FailureKind::ConfigMalformed
        | FailureKind::ResolutionError
        | FailureKind::UnexpectedFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message, outcome) = match self {
            ApiError::BadRequest(msg) => ("bad_request".to_string(), msg, None),
            ApiError::PayloadTooLarge(msg) => ("payload_too_large".to_string(), msg, None),
            ApiError::Internal(msg) => ("internal_error".to_string(), msg, None),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable".to_string(), msg, None),
            ApiError::Dispatch(err) => {
                let outcome = err.kind.outcome_status();
                (err.kind.to_string(), err.message, outcome)
            }
        };

        let body = ErrorBody {
            error: error_code,
            message,
            status: outcome,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::Dispatch(err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Disabled => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::EmptyMessage | ChatError::Parse(_) => ApiError::BadRequest(err.to_string()),
            ChatError::Provider(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}
