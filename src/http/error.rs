//! Error-to-response mapping
//!
//! Domain error kinds map to HTTP status codes; the body carries the kind,
//! a message, offending fields for validation failures, and backoff advice
//! for retryable kinds. In production, `internal` errors surface only a
//! stable error id; the cause is logged server-side.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, FieldError};

/// Wire shape of an error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

/// Whether detailed internal causes are hidden from clients
static SANITIZE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Enable production error sanitization
pub fn set_sanitize(enabled: bool) {
    SANITIZE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict { .. } => StatusCode::CONFLICT,
        Error::Locked(_) => StatusCode::LOCKED,
        Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Error::SolverInfeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::SolverTimeout => StatusCode::GATEWAY_TIMEOUT,
        Error::Cancelled => StatusCode::BAD_REQUEST,
        Error::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        let (message, fields, error_id) = match &self {
            Error::Validation(fields) => (
                "validation failed".to_string(),
                Some(fields.clone()),
                None,
            ),
            Error::Internal(cause) => {
                let id = Uuid::new_v4().to_string();
                tracing::error!(error_id = %id, error = %cause, "Internal error");
                let message = if SANITIZE.load(std::sync::atomic::Ordering::Relaxed) {
                    "an internal error occurred".to_string()
                } else {
                    cause.to_string()
                };
                (message, None, Some(id))
            }
            other => (other.to_string(), None, None),
        };

        let retry_after = match &self {
            Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            e if e.is_retryable() => Some(1),
            _ => None,
        };
        let conflict = match &self {
            Error::Conflict { kind, .. } => Some(kind.as_str().to_string()),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message,
                conflict,
                fields,
                retryable: self.is_retryable(),
                retry_after_secs: retry_after,
                error_id,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}
