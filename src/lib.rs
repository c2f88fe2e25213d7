//! # Enrolla (registration & second-factor enrollment)
//!
//! `enrolla` is the account onboarding service: it handles user registration,
//! email verification, and TOTP second-factor enrollment with QR provisioning.
//!
//! ## Enrollment Flow
//!
//! 1) An account is registered with a normalized email and an Argon2id
//!    password hash; a verification token is issued through the email outbox.
//! 2) The account activates by consuming the emailed token (single use,
//!    fixed expiry window).
//! 3) A verified account enrolls a TOTP device: the service generates a
//!    160-bit seed, seals it at rest, and returns an `otpauth://`
//!    provisioning URI plus a scannable QR image.
//! 4) Submitting one valid time-step code confirms the device. Confirmation
//!    is compare-and-set in the store, so concurrent attempts cannot race,
//!    and repeating it with a valid code is a no-op.
//!
//! ## Security boundaries
//!
//! - Raw verification tokens are never stored; only their SHA-256 hashes.
//! - TOTP seeds are encrypted with ChaCha20-Poly1305 under a service key,
//!   with AAD binding each seed to its account and device identifiers.
//! - Code checks tolerate exactly one 30-second step of clock drift.

pub mod api;
pub mod cli;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
