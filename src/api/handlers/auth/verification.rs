//! Email verification endpoints.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::ApiError;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{ReissueOutcome, TokenOutcome, consume_verification_token, reissue_verification};
use super::types::{Data, VerifyEmailBeginRequest, VerifyEmailResponse};
use super::utils::{extract_client_ip, hash_verification_token, normalize_email, valid_email};

const MAX_TOKEN_CHARS: usize = 128;

/// Begin email verification manually when the automatic email was lost.
///
/// Re-issues a token for a pending account, subject to a per-account
/// cooldown.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailBeginRequest,
    responses(
        (status = 200, description = "Verification email queued", body = VerifyEmailResponse),
        (status = 400, description = "Validation error", body = crate::api::handlers::error::ErrorBody),
        (status = 404, description = "Unknown account", body = crate::api::handlers::error::ErrorBody),
        (status = 409, description = "Already verified", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Rate limited or cooldown", body = crate::api::handlers::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_email_begin(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailBeginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::Validation("Invalid email".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResendVerification)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }
    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::ResendVerification)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    match reissue_verification(&pool, &email, auth_state.config()).await {
        Ok(ReissueOutcome::Queued) => Json(Data {
            data: VerifyEmailResponse {
                email,
                status: "verification_sent".to_string(),
            },
        })
        .into_response(),
        Ok(ReissueOutcome::UnknownAccount) => {
            ApiError::NotFound("Unknown account".to_string()).into_response()
        }
        Ok(ReissueOutcome::AlreadyVerified) => {
            ApiError::Conflict("Email already verified".to_string()).into_response()
        }
        Ok(ReissueOutcome::Cooldown) => ApiError::RateLimited.into_response(),
        Err(err) => {
            error!("Failed to reissue verification: {err}");
            ApiError::Internal.into_response()
        }
    }
}

/// Complete email verification by consuming the emailed token.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email/{token}",
    params(
        ("token" = String, Path, description = "Verification token from the email link")
    ),
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 400, description = "Validation error", body = crate::api::handlers::error::ErrorBody),
        (status = 404, description = "Unknown token", body = crate::api::handlers::error::ErrorBody),
        (status = 409, description = "Token already used", body = crate::api::handlers::error::ErrorBody),
        (status = 410, description = "Token expired", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::api::handlers::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_email_complete(
    headers: HeaderMap,
    Path(token): Path<String>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let token = token.trim();
    if token.is_empty() || token.chars().count() > MAX_TOKEN_CHARS {
        return ApiError::Validation("Invalid token".to_string()).into_response();
    }

    // Rate limits are enforced before any token work to avoid amplification.
    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    // Hash the token before lookup; raw tokens are never stored server-side.
    let token_hash = hash_verification_token(token);

    match consume_verification_token(&pool, &token_hash).await {
        Ok(TokenOutcome::Verified { email }) => (
            StatusCode::OK,
            Json(Data {
                data: VerifyEmailResponse {
                    email,
                    status: "active".to_string(),
                },
            }),
        )
            .into_response(),
        Ok(TokenOutcome::NotFound) => {
            ApiError::NotFound("Unknown token".to_string()).into_response()
        }
        Ok(TokenOutcome::AlreadyUsed) => {
            ApiError::Conflict("Token already used".to_string()).into_response()
        }
        Ok(TokenOutcome::Expired) => ApiError::Expired("Token expired".to_string()).into_response(),
        Err(err) => {
            error!("Failed to verify email: {err}");
            ApiError::Internal.into_response()
        }
    }
}
