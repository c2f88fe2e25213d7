//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Success envelope used by all JSON endpoints.
#[derive(Serialize, Debug)]
pub(crate) struct Data<T: Serialize> {
    pub data: T,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub account_id: String,
    pub email: String,
    pub status: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailBeginRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailResponse {
    pub email: String,
    pub status: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceCreateRequest {
    pub account_id: String,
    pub label: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceCreateResponse {
    pub device_id: String,
    /// Base32 seed for manual entry into authenticator apps.
    pub secret: String,
    pub provisioning_uri: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct QrCodeRequest {
    pub uri: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceVerifyRequest {
    pub device_id: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceVerifyResponse {
    pub device_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn register_request_round_trips() -> Result<()> {
        let request = RegisterRequest {
            email: "alice@example.com".to_string(),
            password: "correct horse battery staple".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: RegisterRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.password, "correct horse battery staple");
        Ok(())
    }

    #[test]
    fn device_create_request_label_is_optional() -> Result<()> {
        let decoded: DeviceCreateRequest = serde_json::from_value(serde_json::json!({
            "account_id": "00000000-0000-0000-0000-000000000000"
        }))?;
        assert!(decoded.label.is_none());
        Ok(())
    }

    #[test]
    fn data_envelope_wraps_payload() -> Result<()> {
        let envelope = Data {
            data: VerifyEmailResponse {
                email: "bob@example.com".to_string(),
                status: "active".to_string(),
            },
        };
        let value = serde_json::to_value(&envelope)?;
        let status = value
            .pointer("/data/status")
            .and_then(serde_json::Value::as_str)
            .context("missing data.status")?;
        assert_eq!(status, "active");
        Ok(())
    }
}
