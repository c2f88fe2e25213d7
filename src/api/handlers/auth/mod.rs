//! Auth handlers and supporting modules.
//!
//! This module coordinates registration, email verification, and TOTP device
//! enrollment.
//!
//! ## Flow Overview
//!
//! 1) `register` creates a `pending_verification` account and enqueues a
//!    verification email through the outbox.
//! 2) `verify-email` (begin) re-issues a token when the automatic email was
//!    lost; `verify-email/{token}` (complete) consumes it and activates the
//!    account.
//! 3) `totp/devices` starts second-factor enrollment for a verified account;
//!    `totp/qrcode` renders the provisioning URI; `totp/devices/verify`
//!    confirms the device with one valid code.
//!
//! ## Security boundaries
//!
//! - Every endpoint consults the injected rate limiter before touching state.
//! - Verification tokens are single-use and expire on a fixed window;
//!   outcomes (unknown, reused, expired) are surfaced as distinct error
//!   kinds rather than collapsed.
//! - Device confirmation is compare-and-set in the store; a failed check
//!   never mutates device state.

pub(crate) mod enroll;
mod rate_limit;
pub(crate) mod register;
mod state;
mod storage;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use rate_limit::{NoopRateLimiter, RateLimiter, WindowRateLimiter};
pub use state::{AuthConfig, AuthState};
