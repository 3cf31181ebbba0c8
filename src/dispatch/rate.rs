//! Global request rate gate
//!
//! Token bucket shared by every worker. Every attempt, retries included,
//! takes one token before it is sent. The bucket holds a single token, so
//! any one-second window sees at most `rate + 1` attempt starts.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Longest gap between attempts; slower rates are clamped to it
const MAX_PERIOD: Duration = Duration::from_secs(1_000_000);

/// Caps attempt starts per second across all workers
pub struct RateGate {
    limiter: Option<DirectLimiter>,
    rate: Option<f64>,
}

impl RateGate {
    /// Gate allowing `rate_per_second` attempt starts. `None` or a
    /// non-positive rate disables the gate.
    pub fn new(rate_per_second: Option<f64>) -> Self {
        let Some(rate) = rate_per_second.filter(|r| r.is_finite() && *r > 0.0) else {
            return Self::unlimited();
        };

        let period = Duration::try_from_secs_f64(1.0 / rate)
            .unwrap_or(MAX_PERIOD)
            .min(MAX_PERIOD);
        let quota = Quota::with_period(period).map(|q| q.allow_burst(NonZeroU32::MIN));

        match quota {
            Some(quota) => {
                tracing::debug!(rate, "Rate gate enabled");
                Self {
                    limiter: Some(RateLimiter::direct(quota)),
                    rate: Some(rate),
                }
            }
            // Period rounds to zero: effectively unlimited
            None => Self::unlimited(),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            rate: None,
        }
    }

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    /// Wait until one more attempt may start
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}
