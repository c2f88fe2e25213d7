use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use uuid::Uuid;

/// Lifecycle state of a second-factor device.
///
/// Transitions are `created -> pending_verification -> confirmed`; no other
/// transition exists. Unconfirmed devices have no effect outside enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Created,
    PendingVerification,
    Confirmed,
}

impl DeviceStatus {
    /// Parse the persisted `totp_devices.status` textual value.
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "created" => Ok(Self::Created),
            "pending_verification" => Ok(Self::PendingVerification),
            "confirmed" => Ok(Self::Confirmed),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid totp_devices.status value: {value}"),
            )))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TotpDevice {
    pub device_id: Uuid,
    pub account_id: Uuid,
    pub label: Option<String>,
    pub algo: String,
    pub digits: i16,
    pub period: i16,
    pub seed_ciphertext: Vec<u8>,
    pub status: DeviceStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for TotpDevice {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            device_id: row.try_get("device_id")?,
            account_id: row.try_get("account_id")?,
            label: row.try_get("label")?,
            algo: row.try_get("algo")?,
            digits: row.try_get("digits")?,
            period: row.try_get("period")?,
            seed_ciphertext: row.try_get("seed_ciphertext")?,
            status: DeviceStatus::from_db(&status)?,
            confirmed_at: row.try_get("confirmed_at")?,
            created_at: row.try_get("created_at")?,
            last_used_at: row.try_get("last_used_at")?,
        })
    }
}
