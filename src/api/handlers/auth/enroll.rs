//! TOTP device enrollment endpoints.
//!
//! `device_create` persists a pending device and returns provisioning
//! material; `device_qrcode` renders a provisioning URI as PNG;
//! `device_verify` confirms the device with one valid time-step code.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, StatusCode,
        header::{CONTENT_TYPE, USER_AGENT},
    },
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use url::Url;
use uuid::Uuid;

use crate::api::handlers::ApiError;
use crate::totp::{ConfirmOutcome, TotpService};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{AccountStatus, lookup_account};
use super::types::{
    Data, DeviceCreateRequest, DeviceCreateResponse, DeviceVerifyRequest, DeviceVerifyResponse,
    QrCodeRequest,
};
use super::utils::extract_client_ip;

const MAX_LABEL_CHARS: usize = 100;
const MAX_URI_CHARS: usize = 512;

/// Create a second-factor device and return its provisioning material.
///
/// The secret and URI are returned exactly once; afterwards only the sealed
/// seed exists server-side.
#[utoipa::path(
    post,
    path = "/v1/auth/totp/devices",
    request_body = DeviceCreateRequest,
    responses(
        (status = 201, description = "Device created", body = DeviceCreateResponse),
        (status = 400, description = "Validation error", body = crate::api::handlers::error::ErrorBody),
        (status = 404, description = "Unknown account", body = crate::api::handlers::error::ErrorBody),
        (status = 409, description = "Email not verified", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::api::handlers::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn device_create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    totp_service: Extension<TotpService>,
    payload: Option<Json<DeviceCreateRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload".to_string()).into_response();
    };

    let Ok(account_id) = Uuid::parse_str(request.account_id.trim()) else {
        return ApiError::Validation("Invalid account ID".to_string()).into_response();
    };

    let label = match request.label {
        Some(label) => {
            let label = label.trim().to_string();
            if label.chars().count() > MAX_LABEL_CHARS {
                return ApiError::Validation("Label too long".to_string()).into_response();
            }
            if label.is_empty() { None } else { Some(label) }
        }
        None => None,
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::EnrollDevice)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let account = match lookup_account(&pool, account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => return ApiError::NotFound("Unknown account".to_string()).into_response(),
        Err(err) => {
            error!("Failed to lookup account for enrollment: {err}");
            return ApiError::Internal.into_response();
        }
    };

    // Second factors protect verified mailboxes only.
    if account.status != AccountStatus::Active {
        return ApiError::Conflict("Email not verified".to_string()).into_response();
    }

    if auth_state
        .rate_limiter()
        .check_email(&account.email, RateLimitAction::EnrollDevice)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    match totp_service
        .begin_enrollment(account_id, &account.email, label)
        .await
    {
        Ok(enrollment) => (
            StatusCode::CREATED,
            Json(Data {
                data: DeviceCreateResponse {
                    device_id: enrollment.device_id.to_string(),
                    secret: enrollment.secret_base32,
                    provisioning_uri: enrollment.provisioning_uri,
                },
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to start TOTP enrollment: {err}");
            ApiError::Internal.into_response()
        }
    }
}

/// Render a provisioning URI as a scannable PNG.
///
/// Success responses carry raw image bytes with `image/png`; errors use the
/// standard JSON envelope.
#[utoipa::path(
    post,
    path = "/v1/auth/totp/qrcode",
    request_body = QrCodeRequest,
    responses(
        (status = 200, description = "QR image", body = [u8], content_type = "image/png"),
        (status = 400, description = "Validation error", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::api::handlers::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn device_qrcode(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<QrCodeRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload".to_string()).into_response();
    };

    let uri = request.uri.trim();
    if uri.is_empty() {
        return ApiError::Validation("Missing provisioning URI".to_string()).into_response();
    }
    if uri.chars().count() > MAX_URI_CHARS {
        return ApiError::Validation("Provisioning URI too long".to_string()).into_response();
    }
    if !uri.starts_with("otpauth://") || Url::parse(uri).is_err() {
        return ApiError::Validation("Invalid provisioning URI".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::RenderQr)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    match crate::totp::qr::encode_png(uri) {
        Ok(png) => ([(CONTENT_TYPE, "image/png")], png).into_response(),
        Err(err) => {
            error!("Failed to render QR code: {err}");
            ApiError::Internal.into_response()
        }
    }
}

/// Confirm a device with one valid time-step code.
#[utoipa::path(
    post,
    path = "/v1/auth/totp/devices/verify",
    request_body = DeviceVerifyRequest,
    responses(
        (status = 200, description = "Device confirmed", body = DeviceVerifyResponse),
        (status = 400, description = "Invalid code", body = crate::api::handlers::error::ErrorBody),
        (status = 404, description = "Unknown device", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::api::handlers::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn device_verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    totp_service: Extension<TotpService>,
    payload: Option<Json<DeviceVerifyRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload".to_string()).into_response();
    };

    let Ok(device_id) = Uuid::parse_str(request.device_id.trim()) else {
        return ApiError::Validation("Invalid device ID".to_string()).into_response();
    };

    let code = request.code.trim();
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return ApiError::Validation("Code must be 6 digits".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ConfirmDevice)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let user_agent = headers.get(USER_AGENT).and_then(|value| value.to_str().ok());

    match totp_service
        .confirm_device(device_id, code, client_ip.as_deref(), user_agent)
        .await
    {
        Ok(ConfirmOutcome::Confirmed | ConfirmOutcome::AlreadyConfirmed) => Json(Data {
            data: DeviceVerifyResponse {
                device_id: device_id.to_string(),
                status: "confirmed".to_string(),
            },
        })
        .into_response(),
        Ok(ConfirmOutcome::InvalidCode) => {
            ApiError::Validation("Invalid TOTP code".to_string()).into_response()
        }
        Ok(ConfirmOutcome::UnknownDevice) => {
            ApiError::NotFound("Unknown device".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to confirm TOTP device: {err}");
            ApiError::Internal.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{
        DeviceCreateRequest, DeviceVerifyRequest, QrCodeRequest, device_create, device_qrcode,
        device_verify,
    };
    use crate::totp::TotpService;
    use anyhow::{Context, Result};
    use axum::Json;
    use axum::extract::Extension;
    use axum::http::{StatusCode, header::CONTENT_TYPE};
    use axum::http::HeaderMap;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(
            AuthConfig::new("https://enrolla.dev".to_string()),
            limiter,
        ))
    }

    fn totp_service() -> Result<TotpService> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(TotpService::new([7u8; 32], pool, "Enrolla".to_string()))
    }

    fn lazy_pool() -> Result<sqlx::PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn device_create_missing_payload() -> Result<()> {
        let response = device_create(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Extension(totp_service()?),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn device_create_invalid_account_id() -> Result<()> {
        let response = device_create(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Extension(totp_service()?),
            Some(Json(DeviceCreateRequest {
                account_id: "not-a-uuid".to_string(),
                label: None,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn qrcode_renders_png() -> Result<()> {
        let response = device_qrcode(
            HeaderMap::new(),
            Extension(auth_state()),
            Some(Json(QrCodeRequest {
                uri: "otpauth://totp/Enrolla:alice%40example.com?secret=JBSWY3DPEHPK3PXP"
                    .to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("image/png")
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(bytes.get(..4), Some(&b"\x89PNG"[..]));
        Ok(())
    }

    #[tokio::test]
    async fn qrcode_rejects_non_otpauth_uri() -> Result<()> {
        let response = device_qrcode(
            HeaderMap::new(),
            Extension(auth_state()),
            Some(Json(QrCodeRequest {
                uri: "https://example.com/phishing".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let kind = value
            .pointer("/error/kind")
            .and_then(serde_json::Value::as_str)
            .context("missing error.kind")?;
        assert_eq!(kind, "validation");
        Ok(())
    }

    #[tokio::test]
    async fn qrcode_rejects_oversized_uri() -> Result<()> {
        let response = device_qrcode(
            HeaderMap::new(),
            Extension(auth_state()),
            Some(Json(QrCodeRequest {
                uri: format!("otpauth://totp/x?secret={}", "A".repeat(1024)),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn device_verify_rejects_malformed_code() -> Result<()> {
        let response = device_verify(
            HeaderMap::new(),
            Extension(auth_state()),
            Extension(totp_service()?),
            Some(Json(DeviceVerifyRequest {
                device_id: uuid::Uuid::nil().to_string(),
                code: "12ab56".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn device_verify_rejects_invalid_device_id() -> Result<()> {
        let response = device_verify(
            HeaderMap::new(),
            Extension(auth_state()),
            Extension(totp_service()?),
            Some(Json(DeviceVerifyRequest {
                device_id: "nope".to_string(),
                code: "123456".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
