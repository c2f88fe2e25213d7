//! TOTP seed generation and provisioning parameters.

use anyhow::{Context, Result, anyhow};
use rand::{RngCore, rngs::OsRng};
use totp_rs::{Algorithm, TOTP};

/// Seed length in bytes; 160 bits as recommended by RFC 4226.
pub const SEED_BYTES: usize = 20;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Draw a fresh random seed from the OS entropy source.
///
/// The raw seed is returned to the caller exactly once; persistence only ever
/// sees the sealed form.
///
/// # Errors
/// Returns an error if the entropy source is unavailable.
pub fn generate_seed() -> Result<Vec<u8>> {
    let mut seed = [0u8; SEED_BYTES];
    OsRng
        .try_fill_bytes(&mut seed)
        .context("failed to draw TOTP seed from OS entropy")?;
    Ok(seed.to_vec())
}

/// Build the TOTP instance used for provisioning URIs and code checks.
///
/// Parameters are fixed to SHA-1 / 6 digits / 30 second steps with a skew of
/// one step, matching what authenticator apps assume for `otpauth://` URIs
/// without explicit parameters.
///
/// # Errors
/// Returns an error if the seed or labels are rejected (e.g. seed below the
/// 128-bit minimum).
pub fn provisioning_totp(issuer: &str, account_label: &str, seed: Vec<u8>) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECONDS,
        seed,
        Some(issuer.to_string()),
        account_label.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_seeds_have_expected_length() -> Result<()> {
        let seed = generate_seed()?;
        assert_eq!(seed.len(), SEED_BYTES);
        Ok(())
    }

    #[test]
    fn generated_seeds_are_unique() -> Result<()> {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_seed()?), "seed collision");
        }
        Ok(())
    }

    #[test]
    fn provisioning_uri_carries_issuer_and_label() -> Result<()> {
        let totp = provisioning_totp("Enrolla", "alice@example.com", generate_seed()?)?;
        let url = totp.get_url();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("issuer=Enrolla"));
        assert!(url.contains("alice%40example.com") || url.contains("alice@example.com"));
        assert!(url.contains("secret="));
        Ok(())
    }

    #[test]
    fn code_valid_within_one_step_only() -> Result<()> {
        let totp = provisioning_totp("Enrolla", "alice@example.com", generate_seed()?)?;
        let now = 30_000; // step-aligned reference time
        let code = totp.generate(now);

        assert!(totp.check(&code, now));
        assert!(totp.check(&code, now + 30), "one step late must validate");
        assert!(totp.check(&code, now - 30), "one step early must validate");
        assert!(!totp.check(&code, now + 60), "two steps late must fail");
        assert!(!totp.check(&code, now - 60), "two steps early must fail");
        Ok(())
    }

    #[test]
    fn short_seed_rejected() {
        let result = provisioning_totp("Enrolla", "alice@example.com", vec![0u8; 8]);
        assert!(result.is_err());
    }
}
