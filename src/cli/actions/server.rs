use crate::{api, totp::crypto::SEAL_KEY_BYTES};
use anyhow::{Result, anyhow};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub email_token_ttl_seconds: i64,
    pub email_resend_cooldown_seconds: i64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
    pub totp_issuer: String,
    pub totp_seal_key: SecretString,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the seal key is malformed or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let seal_key = parse_seal_key(args.totp_seal_key.expose_secret())?;

    let auth_config = api::handlers::auth::AuthConfig::new(args.frontend_base_url)
        .with_issuer(args.totp_issuer)
        .with_email_token_ttl_seconds(args.email_token_ttl_seconds)
        .with_resend_cooldown_seconds(args.email_resend_cooldown_seconds);

    let email_config = api::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, seal_key, auth_config, email_config).await
}

/// Decode the hex-encoded seal key into its fixed-size form.
fn parse_seal_key(hex: &str) -> Result<[u8; SEAL_KEY_BYTES]> {
    let hex = hex.trim();
    if hex.len() != SEAL_KEY_BYTES * 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "TOTP seal key must be {} hex characters",
            SEAL_KEY_BYTES * 2
        ));
    }

    let mut key = [0u8; SEAL_KEY_BYTES];
    for (index, byte) in key.iter_mut().enumerate() {
        let offset = index * 2;
        let pair = hex
            .get(offset..offset + 2)
            .ok_or_else(|| anyhow!("TOTP seal key truncated"))?;
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|e| anyhow!("invalid TOTP seal key hex: {e}"))?;
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::parse_seal_key;

    #[test]
    fn parse_seal_key_accepts_valid_hex() {
        let hex = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
        let key = parse_seal_key(hex);
        assert!(matches!(key, Ok(bytes) if bytes[0] == 0 && bytes[31] == 0x1f));
    }

    #[test]
    fn parse_seal_key_accepts_surrounding_whitespace() {
        let hex = " 000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f\n";
        assert!(parse_seal_key(hex).is_ok());
    }

    #[test]
    fn parse_seal_key_rejects_bad_input() {
        assert!(parse_seal_key("too-short").is_err());
        assert!(parse_seal_key(&"g".repeat(64)).is_err());
        assert!(parse_seal_key(&"00".repeat(33)).is_err());
    }
}
