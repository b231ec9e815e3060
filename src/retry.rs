//! Retry policy: backoff/jitter calculator and retry-eligibility predicate.
//!
//! Stateless apart from the jitter RNG. The policy composes with a circuit
//! breaker externally — a caller loop checks `breaker.can_execute()` before
//! each attempt and uses the policy only to decide whether and how long to
//! wait, so the breaker can still reject attempts the policy would permit.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::schema::RetryConfig;
use crate::errors::CallError;

/// Backoff schedule and eligibility rules for retrying guarded calls.
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    max_retries: u32,
    retryable_statuses: Vec<u16>,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: &RetryConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &RetryConfig, rng: StdRng) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            max_retries: config.max_retries,
            retryable_statuses: config.retryable_statuses.clone(),
            rng: Mutex::new(rng),
        }
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether this error class is worth retrying.
    ///
    /// Timeouts, provider-unavailable, and the configured retryable HTTP
    /// statuses qualify; everything else does not.
    pub fn should_retry(&self, error: &CallError) -> bool {
        match error {
            CallError::Timeout => true,
            CallError::Unavailable(_) => true,
            CallError::Http { status } => self.retryable_statuses.contains(status),
            CallError::Cancelled | CallError::Other(_) => false,
        }
    }

    /// Delay before retry number `attempt` (0-based):
    /// `min(base * 2^attempt, max) + uniform(0, jitter)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exp_ms = base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(max_ms);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            self.rng.lock().unwrap().gen_range(0..jitter_ms)
        };

        Duration::from_millis(exp_ms + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
