//! Database helpers for account and verification state.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::{
    build_verify_url, generate_verification_token, hash_verification_token, is_unique_violation,
};

/// Persisted account lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccountStatus {
    PendingVerification,
    Active,
}

impl AccountStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::Active => "active",
        }
    }

    fn from_db(value: &str) -> Result<Self> {
        match value {
            "pending_verification" => Ok(Self::PendingVerification),
            "active" => Ok(Self::Active),
            _ => Err(anyhow::anyhow!("invalid accounts.status value: {value}")),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AccountRecord {
    pub(crate) account_id: Uuid,
    pub(crate) email: String,
    pub(crate) status: AccountStatus,
}

/// Outcome when attempting to create a new account + verification record.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(AccountRecord),
    Conflict,
}

/// Outcome when consuming a verification token.
///
/// The variants map one-to-one onto the API error kinds, so reuse and expiry
/// stay distinguishable instead of collapsing into a single failure.
#[derive(Debug)]
pub(super) enum TokenOutcome {
    Verified { email: String },
    NotFound,
    AlreadyUsed,
    Expired,
}

/// Outcome when re-issuing a verification token on request.
#[derive(Debug)]
pub(super) enum ReissueOutcome {
    Queued,
    Cooldown,
    AlreadyVerified,
    UnknownAccount,
}

pub(super) async fn create_account(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    config: &AuthConfig,
) -> Result<SignupOutcome> {
    // Transaction keeps account creation, the verification token, and the
    // email outbox row consistent even if something fails midway.
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO accounts
            (email, password_hash, status)
        VALUES ($1, $2, 'pending_verification')
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let account_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert account");
        }
    };

    let _token = insert_verification_records(&mut tx, account_id, email, config).await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created(AccountRecord {
        account_id,
        email: email.to_string(),
        status: AccountStatus::PendingVerification,
    }))
}

pub(super) async fn insert_verification_records(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Uuid,
    email: &str,
    config: &AuthConfig,
) -> Result<String> {
    // Generate a raw token for the email link and store only its hash.
    let token = generate_verification_token()?;
    let token_hash = hash_verification_token(&token);

    let query = r"
        INSERT INTO email_verification_tokens
            (account_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(token_hash)
        .bind(config.email_token_ttl_seconds())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email verification token")?;

    let verify_url = build_verify_url(config.frontend_base_url(), &token);
    let payload_json = json!({
        "email": email,
        "verify_url": verify_url,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind("verify_email")
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(token)
}

pub(super) async fn consume_verification_token(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<TokenOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    // Lock the token row first so concurrent consumption attempts serialize
    // and the state checks below cannot race.
    let query = r"
        SELECT tokens.account_id, tokens.consumed_at, tokens.expires_at, accounts.email
        FROM email_verification_tokens AS tokens
        JOIN accounts ON accounts.id = tokens.account_id
        WHERE tokens.token_hash = $1
        FOR UPDATE OF tokens
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lock verification token")?;

    let Some(row) = row else {
        tx.commit().await.context("commit verify noop")?;
        return Ok(TokenOutcome::NotFound);
    };

    let consumed_at: Option<chrono::DateTime<chrono::Utc>> = row.get("consumed_at");
    if consumed_at.is_some() {
        tx.commit().await.context("commit verify noop")?;
        return Ok(TokenOutcome::AlreadyUsed);
    }

    let expires_at: chrono::DateTime<chrono::Utc> = row.get("expires_at");
    if expires_at <= chrono::Utc::now() {
        tx.commit().await.context("commit verify noop")?;
        return Ok(TokenOutcome::Expired);
    }

    let account_id: Uuid = row.get("account_id");
    let email: String = row.get("email");

    let query = r"
        UPDATE email_verification_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume verification token")?;

    let query = r"
        UPDATE accounts
        SET email_verified_at = NOW(),
            status = 'active',
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to activate account")?;

    tx.commit().await.context("commit verify transaction")?;

    Ok(TokenOutcome::Verified { email })
}

pub(super) async fn reissue_verification(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ReissueOutcome> {
    let mut tx = pool.begin().await.context("begin reissue transaction")?;

    let query = r"
        SELECT id, email, status
        FROM accounts
        WHERE email = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup account for reissue")?;

    let Some(row) = row else {
        tx.commit().await.context("commit reissue noop")?;
        return Ok(ReissueOutcome::UnknownAccount);
    };

    let status: String = row.get("status");
    if AccountStatus::from_db(&status)? != AccountStatus::PendingVerification {
        tx.commit().await.context("commit reissue noop")?;
        return Ok(ReissueOutcome::AlreadyVerified);
    }

    let account_id: Uuid = row.get("id");
    if resend_cooldown_active(&mut tx, account_id, config.resend_cooldown_seconds()).await? {
        tx.commit().await.context("commit reissue cooldown")?;
        return Ok(ReissueOutcome::Cooldown);
    }

    let email: String = row.get("email");
    let _ = insert_verification_records(&mut tx, account_id, &email, config).await?;
    tx.commit().await.context("commit reissue enqueue")?;
    Ok(ReissueOutcome::Queued)
}

async fn resend_cooldown_active(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Uuid,
    cooldown_seconds: i64,
) -> Result<bool> {
    // Cooldown prevents repeated reissue requests from spamming the outbox.
    let query = r"
        SELECT 1
        FROM email_verification_tokens
        WHERE account_id = $1
          AND created_at > NOW() - ($2 * INTERVAL '1 second')
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .bind(cooldown_seconds)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check reissue cooldown")?;
    Ok(row.is_some())
}

/// Look up an account by id (used by device enrollment).
pub(crate) async fn lookup_account(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Option<AccountRecord>> {
    let query = "SELECT id, email, status FROM accounts WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("status");
    Ok(Some(AccountRecord {
        account_id: row.get("id"),
        email: row.get("email"),
        status: AccountStatus::from_db(&status)?,
    }))
}
