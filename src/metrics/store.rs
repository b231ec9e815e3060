//! Lock-free counters of breaker state transitions and retry attempts.
//!
//! One store per scope: the diagnostics hub keeps a global store plus one per
//! tool id. Counters only grow; nothing resets them implicitly — `reset` is
//! the only way back to zero. Reads are eventually consistent with writes
//! (no snapshot isolation across the four counters).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerState;

/// Immutable point-in-time read of a [`MetricsStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetricsSnapshot {
    pub open_count: u64,
    pub half_open_count: u64,
    pub closed_count: u64,
    pub retry_attempts: u64,
}

/// Atomic accumulation of transition and retry counts.
#[derive(Debug, Default)]
pub struct MetricsStore {
    open: AtomicU64,
    half_open: AtomicU64,
    closed: AtomicU64,
    retry_attempts: AtomicU64,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a state transition. Only the state being entered is counted.
    pub fn record_state_change(&self, _previous: BreakerState, current: BreakerState) {
        match current {
            BreakerState::Open => self.open.fetch_add(1, Ordering::Relaxed),
            BreakerState::HalfOpen => self.half_open.fetch_add(1, Ordering::Relaxed),
            BreakerState::Closed => self.closed.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Count a circuit-open occurrence reported directly (without a breaker
    /// transition event), e.g. by a caller observing a rejected call.
    pub fn record_circuit_open(&self) {
        self.open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-blocking read of the current counters.
    pub fn snapshot(&self) -> CircuitMetricsSnapshot {
        CircuitMetricsSnapshot {
            open_count: self.open.load(Ordering::Relaxed),
            half_open_count: self.half_open.load(Ordering::Relaxed),
            closed_count: self.closed.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.open.store(0, Ordering::Relaxed);
        self.half_open.store(0, Ordering::Relaxed);
        self.closed.store(0, Ordering::Relaxed);
        self.retry_attempts.store(0, Ordering::Relaxed);
    }
}
