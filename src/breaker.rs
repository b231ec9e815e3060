//! Circuit breaker for guarded provider calls.
//!
//! Three states: Closed (calls flow), Open (calls rejected until the cooldown
//! elapses), HalfOpen (exactly one probe call allowed at a time). All mutation
//! is serialized behind one mutex per breaker; state transitions are reported
//! to registered listeners outside the lock so observers never run under it.
//!
//! The breaker knows nothing about metrics — wiring transitions into a store
//! is the diagnostics hub's job (see [`crate::hub`]).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::schema::BreakerConfig;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// One observed state change.
#[derive(Debug, Clone)]
pub struct BreakerTransition {
    pub previous: BreakerState,
    pub current: BreakerState,
    pub at: DateTime<Utc>,
}

/// Callback invoked after each state transition.
pub type TransitionListener = Arc<dyn Fn(&BreakerTransition) + Send + Sync>;

struct Inner {
    state: BreakerState,
    failures: u32,
    opened_until: Option<Instant>,
    half_open_in_flight: bool,
}

/// Failure gate around one class of fallible operations.
pub struct CircuitBreaker {
    id: String,
    threshold: u32,
    break_duration: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<TransitionListener>>,
}

impl CircuitBreaker {
    /// Create a breaker. A threshold of 0 is clamped to 1 so the breaker is
    /// always constructible.
    pub fn new(
        id: impl Into<String>,
        failure_threshold: u32,
        break_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id: id.into(),
            threshold: failure_threshold.max(1),
            break_duration,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                opened_until: None,
                half_open_in_flight: false,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create from config.
    pub fn from_config(id: impl Into<String>, config: &BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            id,
            config.failure_threshold,
            Duration::from_secs(config.break_duration_secs),
            clock,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a transition listener. Listeners are called after the lock is
    /// released, in registration order.
    pub fn on_transition(&self, listener: TransitionListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Whether a call may proceed right now.
    ///
    /// In Open, the first call at or past the cooldown deadline flips the
    /// breaker to HalfOpen and becomes the recovery probe. While a probe is in
    /// flight every other caller is rejected.
    pub fn can_execute(&self) -> bool {
        let mut fired = None;
        let allowed = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                BreakerState::Closed => true,
                BreakerState::Open => {
                    let due = inner
                        .opened_until
                        .map(|until| self.clock.now() >= until)
                        .unwrap_or(true);
                    if due {
                        inner.state = BreakerState::HalfOpen;
                        inner.half_open_in_flight = true;
                        fired = Some((BreakerState::Open, BreakerState::HalfOpen));
                        true
                    } else {
                        false
                    }
                }
                BreakerState::HalfOpen => {
                    if inner.half_open_in_flight {
                        false
                    } else {
                        inner.half_open_in_flight = true;
                        true
                    }
                }
            }
        };
        if let Some((previous, current)) = fired {
            debug!("Breaker '{}': cooldown elapsed, probing", self.id);
            self.notify(previous, current);
        }
        allowed
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut fired = None;
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                BreakerState::Closed => {
                    inner.failures = 0;
                }
                BreakerState::HalfOpen => {
                    inner.state = BreakerState::Closed;
                    inner.failures = 0;
                    inner.opened_until = None;
                    inner.half_open_in_flight = false;
                    fired = Some((BreakerState::HalfOpen, BreakerState::Closed));
                }
                // Late success from a call that started before the trip.
                BreakerState::Open => {}
            }
        }
        if let Some((previous, current)) = fired {
            info!("Breaker '{}': probe succeeded, circuit closed", self.id);
            self.notify(previous, current);
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut fired = None;
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                BreakerState::Closed => {
                    inner.failures += 1;
                    if inner.failures >= self.threshold {
                        inner.state = BreakerState::Open;
                        inner.opened_until = Some(self.clock.now() + self.break_duration);
                        fired = Some((BreakerState::Closed, BreakerState::Open));
                    }
                }
                BreakerState::HalfOpen => {
                    // Probe failed: straight back to Open, cooldown re-armed.
                    inner.state = BreakerState::Open;
                    inner.opened_until = Some(self.clock.now() + self.break_duration);
                    inner.half_open_in_flight = false;
                    fired = Some((BreakerState::HalfOpen, BreakerState::Open));
                }
                // Late failure from a call that started before the trip.
                BreakerState::Open => {}
            }
        }
        if let Some((previous, current)) = fired {
            warn!(
                "Breaker '{}': circuit opened for {:?}",
                self.id, self.break_duration
            );
            self.notify(previous, current);
        }
    }

    /// Current state without side effects.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Remaining cooldown while Open, if any.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Open {
            return None;
        }
        inner
            .opened_until
            .map(|until| until.saturating_duration_since(self.clock.now()))
    }

    fn notify(&self, previous: BreakerState, current: BreakerState) {
        let transition = BreakerTransition {
            previous,
            current,
            at: self.clock.wall(),
        };
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in &listeners {
            listener(&transition);
        }
    }
}
