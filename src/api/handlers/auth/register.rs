//! Account registration endpoint.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use rand::rngs::OsRng;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::ApiError;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{SignupOutcome, create_account};
use super::types::{AccountResponse, Data, RegisterRequest};
use super::utils::{extract_client_ip, normalize_email, valid_email, valid_password};

/// Register a new account and enqueue its verification email.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Validation error", body = crate::api::handlers::error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::api::handlers::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::Validation("Invalid email".to_string()).into_response();
    }
    if !valid_password(&request.password) {
        return ApiError::Validation("Password must be 8 to 128 characters".to_string())
            .into_response();
    }

    // Rate limits are enforced before any hashing or storage work.
    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }
    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return ApiError::Internal.into_response();
        }
    };

    match create_account(&pool, &email, &password_hash, auth_state.config()).await {
        Ok(SignupOutcome::Created(record)) => (
            StatusCode::CREATED,
            Json(Data {
                data: AccountResponse {
                    account_id: record.account_id.to_string(),
                    email: record.email,
                    status: record.status.as_str().to_string(),
                },
            }),
        )
            .into_response(),
        Ok(SignupOutcome::Conflict) => {
            ApiError::Conflict("Email already registered".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to register account: {err}");
            ApiError::Internal.into_response()
        }
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("password hash failure: {e}"))
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter, WindowRateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{RegisterRequest, hash_password, register};
    use anyhow::Result;
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    use axum::Json;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use std::time::Duration;

    fn auth_state(limiter: Arc<dyn RateLimiter>) -> Arc<AuthState> {
        let config = AuthConfig::new("https://enrolla.dev".to_string());
        Arc::new(AuthState::new(config, limiter))
    }

    fn lazy_pool() -> Result<sqlx::PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn register_missing_payload() -> Result<()> {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(Arc::new(NoopRateLimiter))),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_invalid_email() -> Result<()> {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(Arc::new(NoopRateLimiter))),
            Some(Json(RegisterRequest {
                email: "not-an-email".to_string(),
                password: "long enough secret".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_short_password() -> Result<()> {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(Arc::new(NoopRateLimiter))),
            Some(Json(RegisterRequest {
                email: "alice@example.com".to_string(),
                password: "short".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rate_limited_by_email() -> Result<()> {
        // Zero-size email window trips immediately, before any storage work.
        let limiter = Arc::new(WindowRateLimiter::new(Duration::from_secs(60), 10, 0));
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(limiter)),
            Some(Json(RegisterRequest {
                email: "alice@example.com".to_string(),
                password: "long enough secret".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }

    #[test]
    fn hash_password_verifies_and_salts() -> Result<()> {
        let first = hash_password("long enough secret")?;
        let second = hash_password("long enough secret")?;
        assert_ne!(first, second, "salts must differ");

        let parsed = PasswordHash::new(&first).map_err(|e| anyhow::anyhow!("{e}"))?;
        assert!(
            Argon2::default()
                .verify_password(b"long enough secret", &parsed)
                .is_ok()
        );
        assert!(
            Argon2::default()
                .verify_password(b"wrong password", &parsed)
                .is_err()
        );
        Ok(())
    }
}
