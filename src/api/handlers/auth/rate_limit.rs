//! Rate limiting primitives for auth flows.
//!
//! Handlers depend only on the [`RateLimiter`] trait; the concrete limiter is
//! injected through [`super::AuthState`], so deployments can swap the
//! in-memory window for a shared store without touching handlers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Register,
    VerifyEmail,
    ResendVerification,
    EnrollDevice,
    ConfirmDevice,
    RenderQr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_IP_LIMIT: usize = 30;
const DEFAULT_EMAIL_LIMIT: usize = 10;

/// In-memory sliding-window limiter.
///
/// Hit timestamps are kept per `(key, action)` and pruned on access; the map
/// never grows beyond keys seen within the window. Suitable for a single
/// instance; multi-instance deployments want a store-backed implementation.
#[derive(Debug)]
pub struct WindowRateLimiter {
    window: Duration,
    ip_limit: usize,
    email_limit: usize,
    hits: Mutex<HashMap<(String, RateLimitAction), Vec<Instant>>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(window: Duration, ip_limit: usize, email_limit: usize) -> Self {
        Self {
            window,
            ip_limit,
            email_limit,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn note(&self, key: (String, RateLimitAction), limit: usize) -> RateLimitDecision {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);

        hits.retain(|_, stamps| {
            stamps.retain(|stamp| now.duration_since(*stamp) < self.window);
            !stamps.is_empty()
        });

        let stamps = hits.entry(key).or_default();
        if stamps.len() >= limit {
            return RateLimitDecision::Limited;
        }
        stamps.push(now);
        RateLimitDecision::Allowed
    }
}

impl Default for WindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_IP_LIMIT, DEFAULT_EMAIL_LIMIT)
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Requests without a resolvable client IP are not limited here; the
        // per-email check still applies.
        let Some(ip) = ip else {
            return RateLimitDecision::Allowed;
        };
        self.note((format!("ip:{ip}"), action), self.ip_limit)
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.note((format!("email:{email}"), action), self.email_limit)
    }
}
