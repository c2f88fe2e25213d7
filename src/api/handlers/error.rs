//! Structured error envelope shared by all API handlers.
//!
//! Every non-success response carries `{"error": {"kind": ..., "message": ...}}`
//! so clients can branch on the kind without parsing prose. Internals are
//! logged at the call site and surfaced as an opaque `internal` envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// Unknown account, device, or token.
    #[error("{0}")]
    NotFound(String),
    /// The resource is already in the requested state or already used.
    #[error("{0}")]
    Conflict(String),
    /// The token or time window has elapsed.
    #[error("{0}")]
    Expired(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Internal error")]
    Internal,
}

impl ApiError {
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Expired(_) => "expired",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
        }
    }

    pub(crate) const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Expired(_) => StatusCode::GONE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorDetail {
    /// One of: validation, not_found, conflict, expired, rate_limited, internal.
    pub kind: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
