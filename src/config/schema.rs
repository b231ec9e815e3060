//! Configuration schema for breakwater.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so that the JSON config
//! file can use camelCase keys while Rust code uses snake_case fields. Every
//! field has a serde default so partial config files always load.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long the circuit stays open before a recovery probe is allowed.
    #[serde(default = "default_break_duration_secs")]
    pub break_duration_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_break_duration_secs() -> u64 {
    30
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            break_duration_secs: default_break_duration_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Backoff and retry-eligibility tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Uniform jitter added on top of the exponential delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// HTTP statuses considered retryable.
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    2
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![429, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics history
// ---------------------------------------------------------------------------

/// Bounds on the metrics sample history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Samples older than this are evicted.
    #[serde(default = "default_history_window_minutes")]
    pub window_minutes: u64,
    /// Hard cap on retained samples, oldest dropped first.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_history_window_minutes() -> u64 {
    60
}

fn default_max_samples() -> usize {
    300
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_history_window_minutes(),
            max_samples: default_max_samples(),
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Alert event retention and listing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsConfig {
    /// FIFO cap on retained alert events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Default page size when listing events.
    #[serde(default = "default_event_limit")]
    pub default_event_limit: usize,
}

fn default_event_capacity() -> usize {
    200
}

fn default_event_limit() -> usize {
    50
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            default_event_limit: default_event_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider health
// ---------------------------------------------------------------------------

/// Provider health tracking and automatic reconnect tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// A reachable provider with no success for longer than this is stale.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Fixed backoff schedule for the background reconnect loop.
    #[serde(default = "default_retry_schedule_secs")]
    pub retry_schedule_secs: Vec<u64>,
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_retry_schedule_secs() -> Vec<u64> {
    vec![1, 5, 15, 60]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            retry_schedule_secs: default_retry_schedule_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Config {
    /// Clamp out-of-range values to the nearest usable ones. Bad settings
    /// degrade, they never prevent the core from being built.
    pub fn normalized(mut self) -> Self {
        self.breaker.failure_threshold = self.breaker.failure_threshold.max(1);
        self.breaker.break_duration_secs = self.breaker.break_duration_secs.max(1);
        self.retry.max_delay_ms = self.retry.max_delay_ms.max(self.retry.base_delay_ms);
        self.history.window_minutes = self.history.window_minutes.max(1);
        self.history.max_samples = self.history.max_samples.max(1);
        self.alerts.event_capacity = self.alerts.event_capacity.max(1);
        self.alerts.default_event_limit = self.alerts.default_event_limit.max(1);
        if self.provider.retry_schedule_secs.is_empty() {
            self.provider.retry_schedule_secs = default_retry_schedule_secs();
        }
        self
    }
}
