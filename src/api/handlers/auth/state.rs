//! Auth state and configuration.

use std::sync::Arc;

use super::rate_limit::RateLimiter;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_ISSUER: &str = "Enrolla";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    issuer: String,
    email_token_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            issuer: DEFAULT_ISSUER.to_string(),
            email_token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    /// Issuer embedded in provisioning URIs.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }

    pub(super) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    pub fn new(config: AuthConfig, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            config,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimitAction, RateLimitDecision};
    use super::{AuthConfig, AuthState};
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://enrolla.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://enrolla.dev");
        assert_eq!(config.issuer(), super::DEFAULT_ISSUER);
        assert_eq!(
            config.email_token_ttl_seconds(),
            super::DEFAULT_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );

        let config = config
            .with_issuer("Acme".to_string())
            .with_email_token_ttl_seconds(120)
            .with_resend_cooldown_seconds(30);

        assert_eq!(config.issuer(), "Acme");
        assert_eq!(config.email_token_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 30);
    }

    #[test]
    fn auth_state_exposes_injected_rate_limiter() {
        let config = AuthConfig::new("https://enrolla.dev".to_string());
        let state = AuthState::new(config, Arc::new(NoopRateLimiter));
        assert_eq!(
            state
                .rate_limiter()
                .check_ip(Some("1.2.3.4"), RateLimitAction::Register),
            RateLimitDecision::Allowed
        );
    }
}
