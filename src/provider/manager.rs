//! Provider health manager: enabled/reachable tracking, uptime accounting,
//! and a background reconnect loop.
//!
//! Uptime accrues only while the provider is both enabled and reachable;
//! every other combination accrues downtime. Elapsed time is integrated
//! lazily — on each state change and on snapshot — rather than by a ticking
//! timer. When an enabled provider goes unreachable, a background loop walks
//! a fixed backoff schedule invoking the configured retry handler; the first
//! success marks the provider reachable and stops the loop. Exhausting the
//! schedule ends the loop — a later [`ProviderHealthManager::retry_now`] call
//! is the only way to start another round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::schema::ProviderConfig;

/// Where the provider runs. A tag, not a behavior split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Cloud,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Cloud => write!(f, "cloud"),
        }
    }
}

/// Handler invoked by the background loop to re-establish the provider.
#[async_trait::async_trait]
pub trait RetryHandler: Send + Sync {
    async fn attempt(&self) -> anyhow::Result<()>;
}

/// Derived health report, recomputed on every state change and on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetricsSnapshot {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub reachable: bool,
    pub is_stale: bool,
    pub total_uptime_seconds: u64,
    pub total_downtime_seconds: u64,
    pub retry_attempts: u64,
    pub retry_successes: u64,
    pub retry_failures: u64,
    pub enable_transitions: u64,
    pub disable_transitions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_for_seconds: Option<u64>,
}

struct HealthState {
    enabled: bool,
    reachable: bool,
    uptime: Duration,
    downtime: Duration,
    /// When the running totals were last integrated.
    anchored_at: Instant,
    retry_attempts: u64,
    retry_successes: u64,
    retry_failures: u64,
    enable_transitions: u64,
    disable_transitions: u64,
    last_event: Option<DateTime<Utc>>,
    last_success: Option<(Instant, DateTime<Utc>)>,
}

impl HealthState {
    /// Flush elapsed time since the anchor into the right bucket.
    fn integrate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.anchored_at);
        if self.enabled && self.reachable {
            self.uptime += elapsed;
        } else {
            self.downtime += elapsed;
        }
        self.anchored_at = now;
    }
}

struct Shared {
    kind: ProviderKind,
    state: Mutex<HealthState>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    schedule: Vec<Duration>,
    handler: Option<Arc<dyn RetryHandler>>,
    snapshot_tx: watch::Sender<ProviderMetricsSnapshot>,
}

impl Shared {
    fn snapshot(&self) -> ProviderMetricsSnapshot {
        let mut state = self.state.lock().unwrap();
        let now = self.clock.now();
        state.integrate(now);

        let stale_for = state.last_success.and_then(|(at, _)| {
            if !(state.enabled && state.reachable) {
                return None;
            }
            let since = now.saturating_duration_since(at);
            if since > self.stale_after {
                Some(since.as_secs())
            } else {
                None
            }
        });

        ProviderMetricsSnapshot {
            kind: self.kind,
            enabled: state.enabled,
            reachable: state.reachable,
            is_stale: stale_for.is_some(),
            total_uptime_seconds: state.uptime.as_secs(),
            total_downtime_seconds: state.downtime.as_secs(),
            retry_attempts: state.retry_attempts,
            retry_successes: state.retry_successes,
            retry_failures: state.retry_failures,
            enable_transitions: state.enable_transitions,
            disable_transitions: state.disable_transitions,
            last_event: state.last_event,
            last_success: state.last_success.map(|(_, wall)| wall),
            stale_for_seconds: stale_for,
        }
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.snapshot());
    }

    fn is_reachable(&self) -> bool {
        self.state.lock().unwrap().reachable
    }

    /// Flip reachability. Returns false when the value was unchanged.
    fn set_reachable(&self, value: bool, detail: Option<&str>) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.reachable == value {
                return false;
            }
            state.integrate(self.clock.now());
            state.reachable = value;
            state.last_event = Some(self.clock.wall());
        }
        match (value, detail) {
            (true, _) => info!("Provider {} reachable", self.kind),
            (false, Some(d)) => warn!("Provider {} unreachable: {}", self.kind, d),
            (false, None) => warn!("Provider {} unreachable", self.kind),
        }
        self.publish();
        true
    }
}

struct RetryTask {
    cancelled: Arc<AtomicBool>,
}

/// Tracks one external provider's health and drives its reconnect loop.
pub struct ProviderHealthManager {
    shared: Arc<Shared>,
    retry_task: Mutex<Option<RetryTask>>,
}

impl ProviderHealthManager {
    pub fn new(
        kind: ProviderKind,
        config: &ProviderConfig,
        handler: Option<Arc<dyn RetryHandler>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let initial = HealthState {
            enabled: false,
            reachable: false,
            uptime: Duration::ZERO,
            downtime: Duration::ZERO,
            anchored_at: now,
            retry_attempts: 0,
            retry_successes: 0,
            retry_failures: 0,
            enable_transitions: 0,
            disable_transitions: 0,
            last_event: None,
            last_success: None,
        };
        let schedule: Vec<Duration> = config
            .retry_schedule_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect();

        let placeholder = ProviderMetricsSnapshot {
            kind,
            enabled: false,
            reachable: false,
            is_stale: false,
            total_uptime_seconds: 0,
            total_downtime_seconds: 0,
            retry_attempts: 0,
            retry_successes: 0,
            retry_failures: 0,
            enable_transitions: 0,
            disable_transitions: 0,
            last_event: None,
            last_success: None,
            stale_for_seconds: None,
        };
        let (snapshot_tx, _) = watch::channel(placeholder);

        Self {
            shared: Arc::new(Shared {
                kind,
                state: Mutex::new(initial),
                clock,
                stale_after: Duration::from_secs(config.stale_after_secs),
                schedule,
                handler,
                snapshot_tx,
            }),
            retry_task: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.shared.kind
    }

    /// Subscribe to snapshot updates published on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProviderMetricsSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Enable or disable the provider. Unchanged values are a no-op.
    pub fn update_enabled(&self, enabled: bool) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.enabled == enabled {
                return;
            }
            state.integrate(self.shared.clock.now());
            state.enabled = enabled;
            if enabled {
                state.enable_transitions += 1;
            } else {
                state.disable_transitions += 1;
            }
            state.last_event = Some(self.shared.clock.wall());
        }
        info!(
            "Provider {} {}",
            self.shared.kind,
            if enabled { "enabled" } else { "disabled" }
        );
        if !enabled {
            // Reconnecting a disabled provider is pointless.
            self.cancel_retry_loop();
        }
        self.shared.publish();
    }

    /// Report reachability. Unchanged values are a no-op. Losing reachability
    /// while enabled starts the background reconnect loop; regaining it
    /// cancels any loop in flight.
    pub fn mark_reachable(&self, reachable: bool, detail: Option<&str>) {
        if !self.shared.set_reachable(reachable, detail) {
            return;
        }
        if reachable {
            self.cancel_retry_loop();
        } else if self.shared.state.lock().unwrap().enabled {
            self.start_retry_loop();
        }
    }

    /// Record a successful provider call, for staleness tracking.
    pub fn record_success(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.last_success = Some((self.shared.clock.now(), self.shared.clock.wall()));
        }
        self.shared.publish();
    }

    /// Current health report. Integrates elapsed time as a side effect.
    pub fn snapshot(&self) -> ProviderMetricsSnapshot {
        self.shared.snapshot()
    }

    /// Zero all counters and durations and re-anchor accounting to now.
    /// The enabled/reachable flags are untouched.
    pub fn reset_metrics(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.uptime = Duration::ZERO;
            state.downtime = Duration::ZERO;
            state.anchored_at = self.shared.clock.now();
            state.retry_attempts = 0;
            state.retry_successes = 0;
            state.retry_failures = 0;
            state.enable_transitions = 0;
            state.disable_transitions = 0;
            state.last_event = Some(self.shared.clock.wall());
            state.last_success = None;
        }
        debug!("Provider {} metrics reset", self.shared.kind);
        self.shared.publish();
    }

    /// Externally trigger a fresh reconnect round (e.g. from a CLI command
    /// after the automatic schedule was exhausted).
    pub fn retry_now(&self) {
        self.start_retry_loop();
    }

    /// Stop any running reconnect loop. The signal is cooperative: the loop
    /// checks it around each sleep and before invoking the handler.
    pub fn cancel_retry_loop(&self) {
        let mut guard = self.retry_task.lock().unwrap();
        if let Some(task) = guard.take() {
            task.cancelled.store(true, Ordering::Relaxed);
        }
    }

    fn start_retry_loop(&self) {
        let mut guard = self.retry_task.lock().unwrap();
        // At most one loop: signal the previous one before starting anew.
        if let Some(task) = guard.take() {
            task.cancelled.store(true, Ordering::Relaxed);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let flag = Arc::clone(&cancelled);

        tokio::spawn(async move {
            for (step, delay) in shared.schedule.iter().enumerate() {
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                tokio::time::sleep(*delay).await;
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                if shared.is_reachable() {
                    return;
                }

                let handler = match shared.handler.as_ref() {
                    Some(h) => Arc::clone(h),
                    None => return,
                };
                if flag.load(Ordering::Relaxed) {
                    return;
                }

                {
                    let mut state = shared.state.lock().unwrap();
                    state.retry_attempts += 1;
                }
                debug!(
                    "Provider {} reconnect attempt {} of {}",
                    shared.kind,
                    step + 1,
                    shared.schedule.len()
                );

                match handler.attempt().await {
                    Ok(()) => {
                        {
                            let mut state = shared.state.lock().unwrap();
                            state.retry_successes += 1;
                        }
                        shared.set_reachable(true, Some("reconnect succeeded"));
                        return;
                    }
                    Err(e) => {
                        let mut state = shared.state.lock().unwrap();
                        state.retry_failures += 1;
                        drop(state);
                        warn!("Provider {} reconnect failed: {}", shared.kind, e);
                        shared.publish();
                    }
                }
            }
            debug!("Provider {} reconnect schedule exhausted", shared.kind);
        });

        *guard = Some(RetryTask { cancelled });
    }
}
