//! Backoff delays for the agent's retry loop.

use std::time::Duration;

use rand::Rng;

use crate::error::ParleyError;

/// Delays applied between model calls.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Lower bound of the random rate-limit delay.
    pub rate_limit_min: Duration,
    /// Upper bound of the random rate-limit delay.
    pub rate_limit_max: Duration,
    /// Ceiling on a provider-supplied retry-after.
    pub retry_after_cap: Duration,
    /// Pause before re-invoking after a transport failure.
    pub recall_pause: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_min: Duration::from_secs(1),
            rate_limit_max: Duration::from_secs(16),
            retry_after_cap: Duration::from_secs(60),
            recall_pause: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            rate_limit_min: Duration::ZERO,
            rate_limit_max: Duration::ZERO,
            retry_after_cap: Duration::ZERO,
            recall_pause: Duration::ZERO,
        }
    }

    /// Uniform random delay in the rate-limit window, or the provider's
    /// retry-after when that is longer (capped).
    pub fn rate_limit_delay(&self, error: &ParleyError) -> Duration {
        let min = self.rate_limit_min.as_secs_f64();
        let max = self.rate_limit_max.as_secs_f64().max(min);
        let jitter = if max > min {
            Duration::from_secs_f64(rand::thread_rng().gen_range(min..=max))
        } else {
            self.rate_limit_min
        };
        let hinted = match error {
            ParleyError::RateLimited {
                retry_after_ms: Some(ms),
            } => Duration::from_millis(*ms).min(self.retry_after_cap),
            _ => Duration::ZERO,
        };
        jitter.max(hinted)
    }

    pub fn recall_pause(&self) -> Duration {
        self.recall_pause
    }
}
