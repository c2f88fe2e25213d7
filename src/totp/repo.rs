use crate::totp::models::TotpDevice;
use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

pub struct TotpRepo;

impl TotpRepo {
    /// Create a device and issue it for verification.
    ///
    /// Any earlier unconfirmed device for the account is replaced. The row is
    /// inserted `created` and promoted to `pending_verification` in the same
    /// transaction once provisioning material has been issued, so the state
    /// machine's first transition is recorded in the store.
    ///
    /// # Errors
    /// Returns an error if any statement in the transaction fails.
    pub async fn create_device(
        pool: &PgPool,
        device_id: Uuid,
        account_id: Uuid,
        seed_ciphertext: &[u8],
        label: Option<&str>,
    ) -> Result<()> {
        let mut tx = pool.begin().await.context("begin create-device")?;

        // A fresh enrollment supersedes any unconfirmed attempt.
        let query = "DELETE FROM totp_devices WHERE account_id = $1 AND status <> 'confirmed'";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to drop stale unconfirmed devices")?;

        let query = r"
            INSERT INTO totp_devices
                (device_id, account_id, seed_ciphertext, label, algo, digits, period, status)
            VALUES ($1, $2, $3, $4, 'SHA1', 6, 30, 'created')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(device_id)
            .bind(account_id)
            .bind(seed_ciphertext)
            .bind(label)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert TOTP device")?;

        let query = r"
            UPDATE totp_devices
            SET status = 'pending_verification'
            WHERE device_id = $1
              AND status = 'created'
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(device_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to issue device for verification")?;

        tx.commit().await.context("commit create-device")?;
        Ok(())
    }

    /// Fetch a device by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_device(pool: &PgPool, device_id: Uuid) -> Result<Option<TotpDevice>> {
        let query = "SELECT * FROM totp_devices WHERE device_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, TotpDevice>(query)
            .bind(device_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch TOTP device")
    }

    /// Confirm a device with compare-and-set semantics.
    ///
    /// The update only applies while the device is still
    /// `pending_verification`, so concurrent confirmations serialize on the
    /// row; exactly one caller observes `true`. Other devices of the account
    /// are removed in the same transaction, keeping at most one confirmed
    /// device per account.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn confirm_device(pool: &PgPool, account_id: Uuid, device_id: Uuid) -> Result<bool> {
        let mut tx = pool.begin().await.context("begin confirm-device")?;

        let query = r"
            UPDATE totp_devices
            SET status = 'confirmed',
                confirmed_at = NOW()
            WHERE device_id = $1
              AND status = 'pending_verification'
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(device_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to confirm TOTP device")?;

        if result.rows_affected() == 0 {
            // Lost the race or the device was never pending; nothing to change.
            tx.commit().await.context("commit confirm-device noop")?;
            return Ok(false);
        }

        let query = "DELETE FROM totp_devices WHERE account_id = $1 AND device_id <> $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(device_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to drop superseded devices")?;

        tx.commit().await.context("commit confirm-device")?;
        Ok(true)
    }

    /// Append an enrollment audit record.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn log_audit(
        pool: &PgPool,
        account_id: Uuid,
        device_id: Option<Uuid>,
        action: &str,
        ip: Option<&str>,
        ua: Option<&str>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO totp_audit_log (account_id, device_id, action, ip_address, user_agent)
            VALUES ($1, $2, $3, $4::inet, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(device_id)
            .bind(action)
            .bind(ip)
            .bind(ua)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to write TOTP audit record")?;
        Ok(())
    }
}
