use crate::totp::{crypto, models::DeviceStatus, repo::TotpRepo, secret};
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Provisioning material returned to the enrolling user exactly once.
#[derive(Debug)]
pub struct Enrollment {
    pub device_id: Uuid,
    pub secret_base32: String,
    pub provisioning_uri: String,
}

/// Result of a confirmation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// First valid code; the device transitioned to `confirmed`.
    Confirmed,
    /// Valid code against an already-confirmed device; state untouched.
    AlreadyConfirmed,
    /// The code did not match inside the allowed drift window.
    InvalidCode,
    /// No device with that id exists.
    UnknownDevice,
}

#[derive(Clone)]
pub struct TotpService {
    seal_key: Arc<[u8; crypto::SEAL_KEY_BYTES]>,
    pool: PgPool,
    issuer: String,
}

impl TotpService {
    #[must_use]
    pub fn new(seal_key: [u8; crypto::SEAL_KEY_BYTES], pool: PgPool, issuer: String) -> Self {
        Self {
            seal_key: Arc::new(seal_key),
            pool,
            issuer,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Begin enrollment: generate a seed, seal it, persist the device, and
    /// return the base32 secret plus the `otpauth://` provisioning URI.
    ///
    /// # Errors
    /// Returns an error if seed generation, sealing, or persistence fails.
    pub async fn begin_enrollment(
        &self,
        account_id: Uuid,
        account_email: &str,
        label: Option<String>,
    ) -> Result<Enrollment> {
        let seed = secret::generate_seed()?;
        let device_id = Uuid::new_v4();

        let sealed = crypto::seal_seed(&self.seal_key, &seed, account_id, device_id)?;

        TotpRepo::create_device(&self.pool, device_id, account_id, &sealed, label.as_deref())
            .await?;

        let totp = secret::provisioning_totp(&self.issuer, account_email, seed)?;

        Ok(Enrollment {
            device_id,
            secret_base32: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
        })
    }

    /// Confirm a device with one valid time-step code.
    ///
    /// The code is checked before any state is touched; an invalid code never
    /// changes the device. A valid code against an already-confirmed device
    /// is an idempotent no-op.
    ///
    /// # Errors
    /// Returns an error if the store, unsealing, or audit logging fails.
    pub async fn confirm_device(
        &self,
        device_id: Uuid,
        code: &str,
        ip: Option<&str>,
        ua: Option<&str>,
    ) -> Result<ConfirmOutcome> {
        let Some(device) = TotpRepo::get_device(&self.pool, device_id).await? else {
            return Ok(ConfirmOutcome::UnknownDevice);
        };

        let seed = crypto::open_seed(
            &self.seal_key,
            &device.seed_ciphertext,
            device.account_id,
            device_id,
        )?;

        // Label doesn't matter for checking codes.
        let totp = secret::provisioning_totp(&self.issuer, "account", seed)?;
        let valid = totp.check_current(code).unwrap_or(false);

        if !valid {
            TotpRepo::log_audit(
                &self.pool,
                device.account_id,
                Some(device_id),
                "confirm_fail",
                ip,
                ua,
            )
            .await?;
            return Ok(ConfirmOutcome::InvalidCode);
        }

        if device.status == DeviceStatus::Confirmed {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        let transitioned = TotpRepo::confirm_device(&self.pool, device.account_id, device_id).await?;
        TotpRepo::log_audit(
            &self.pool,
            device.account_id,
            Some(device_id),
            "confirm",
            ip,
            ua,
        )
        .await?;

        // A concurrent request may have won the compare-and-set; both callers
        // still report success for the same valid code.
        Ok(if transitioned {
            ConfirmOutcome::Confirmed
        } else {
            ConfirmOutcome::AlreadyConfirmed
        })
    }
}
