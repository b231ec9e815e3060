//! Alert rules evaluated against metrics history deltas.
//!
//! Operators define threshold rules; each evaluation pass compares the current
//! counters against a baseline sample from the history window and raises an
//! event when a rule first crosses into breach. A per-rule "active" flag gives
//! breach hysteresis: while a rule stays breached no duplicate events are
//! created, and only after it clears can the next breach fire again.
//!
//! Invalid rule inputs are normalized, not rejected — negative thresholds
//! clamp to 0 (disabled), window to at least one minute, unknown severities
//! fall back to warning.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::schema::AlertsConfig;
use crate::metrics::history::MetricsSample;
use crate::metrics::store::CircuitMetricsSnapshot;

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Strict parse; `None` for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "warning" => Some(AlertSeverity::Warning),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }

    /// Lenient normalization used for rule input: unknown or absent values
    /// become warning.
    pub fn normalize(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or(AlertSeverity::Warning)
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules and events
// ---------------------------------------------------------------------------

/// A threshold definition. Thresholds of 0 disable that dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub open_threshold: u64,
    pub retry_threshold: u64,
    pub window_minutes: u32,
    pub severity: AlertSeverity,
    pub enabled: bool,
}

/// Partial update for a rule; unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub open_threshold: Option<i64>,
    pub retry_threshold: Option<i64>,
    pub window_minutes: Option<i64>,
    pub severity: Option<AlertSeverity>,
    pub enabled: Option<bool>,
}

/// One breach occurrence. Mutated exactly once (acknowledgement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub triggered_at: DateTime<Utc>,
    pub open_delta: u64,
    pub retry_delta: u64,
    pub acknowledged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Filters for [`AlertStore::list_events`].
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub limit: Option<usize>,
    pub severity: Option<AlertSeverity>,
    pub include_acknowledged: bool,
    pub rule_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Inner {
    rules: Vec<AlertRule>,
    /// Per-rule breach latch for hysteresis.
    active: HashMap<String, bool>,
    events: VecDeque<AlertEvent>,
}

/// Rule set plus capacity-bounded event log.
pub struct AlertStore {
    inner: Mutex<Inner>,
    event_capacity: usize,
    default_limit: usize,
    clock: Arc<dyn Clock>,
}

impl AlertStore {
    pub fn new(config: &AlertsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rules: Vec::new(),
                active: HashMap::new(),
                events: VecDeque::new(),
            }),
            event_capacity: config.event_capacity.max(1),
            default_limit: config.default_event_limit.max(1),
            clock,
        }
    }

    /// Add a rule, normalizing inputs. An absent name gets a generated one.
    pub fn add_rule(
        &self,
        name: Option<String>,
        open_threshold: i64,
        retry_threshold: i64,
        window_minutes: i64,
        severity: Option<&str>,
    ) -> AlertRule {
        let id = short_id();
        let rule = AlertRule {
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("rule-{}", id)),
            id,
            open_threshold: open_threshold.max(0) as u64,
            retry_threshold: retry_threshold.max(0) as u64,
            window_minutes: window_minutes.max(1) as u32,
            severity: AlertSeverity::normalize(severity),
            enabled: true,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.active.insert(rule.id.clone(), false);
        inner.rules.push(rule.clone());
        rule
    }

    /// Apply a partial update. Returns `None` for an unknown rule id.
    pub fn update_rule(&self, rule_id: &str, update: &RuleUpdate) -> Option<AlertRule> {
        let mut inner = self.inner.lock().unwrap();
        let rule = inner.rules.iter_mut().find(|r| r.id == rule_id)?;
        if let Some(ref name) = update.name {
            if !name.trim().is_empty() {
                rule.name = name.clone();
            }
        }
        if let Some(v) = update.open_threshold {
            rule.open_threshold = v.max(0) as u64;
        }
        if let Some(v) = update.retry_threshold {
            rule.retry_threshold = v.max(0) as u64;
        }
        if let Some(v) = update.window_minutes {
            rule.window_minutes = v.max(1) as u32;
        }
        if let Some(v) = update.severity {
            rule.severity = v;
        }
        if let Some(v) = update.enabled {
            rule.enabled = v;
        }
        Some(rule.clone())
    }

    /// Remove a rule. Past events referencing it are kept. Returns whether a
    /// rule was removed.
    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id != rule_id);
        inner.active.remove(rule_id);
        inner.rules.len() < before
    }

    /// Remove every rule. Returns how many were removed.
    pub fn clear_rules(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.rules.len();
        inner.rules.clear();
        inner.active.clear();
        n
    }

    /// All rules ordered by name.
    pub fn list_rules(&self) -> Vec<AlertRule> {
        let inner = self.inner.lock().unwrap();
        let mut rules = inner.rules.clone();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    pub fn rule(&self, rule_id: &str) -> Option<AlertRule> {
        let inner = self.inner.lock().unwrap();
        inner.rules.iter().find(|r| r.id == rule_id).cloned()
    }

    /// Evaluate every enabled rule against the current counters and the
    /// history window. Returns the events created by this pass.
    ///
    /// The baseline is the oldest sample at or after the window cutoff; rules
    /// with no sample in their window are skipped. Sparse sampling can
    /// understate deltas (the baseline sits later than the true window start);
    /// thresholds are tuned against that behavior, so it is kept as-is.
    pub fn evaluate(
        &self,
        current: &CircuitMetricsSnapshot,
        history: &[MetricsSample],
    ) -> Vec<AlertEvent> {
        let now = self.clock.wall();
        let mut created = Vec::new();
        let mut inner = self.inner.lock().unwrap();

        let rules: Vec<AlertRule> = inner.rules.iter().filter(|r| r.enabled).cloned().collect();
        for rule in rules {
            let cutoff = now - chrono::Duration::minutes(rule.window_minutes as i64);
            let baseline = match history.iter().find(|s| s.timestamp >= cutoff) {
                Some(s) => s,
                None => continue, // insufficient history
            };

            let open_delta = current.open_count.saturating_sub(baseline.metrics.open_count);
            let retry_delta = current
                .retry_attempts
                .saturating_sub(baseline.metrics.retry_attempts);

            let breached = (rule.open_threshold > 0 && open_delta > rule.open_threshold)
                || (rule.retry_threshold > 0 && retry_delta > rule.retry_threshold);

            let was_active = inner.active.get(&rule.id).copied().unwrap_or(false);
            if breached && !was_active {
                let event = AlertEvent {
                    id: short_id(),
                    rule_id: rule.id.clone(),
                    message: format!(
                        "{}: +{} circuit opens / +{} retries in {}m (thresholds {}/{})",
                        rule.name,
                        open_delta,
                        retry_delta,
                        rule.window_minutes,
                        rule.open_threshold,
                        rule.retry_threshold,
                    ),
                    severity: rule.severity,
                    triggered_at: now,
                    open_delta,
                    retry_delta,
                    acknowledged: false,
                    acknowledged_at: None,
                };
                warn!("Alert triggered: {}", event.message);
                inner.active.insert(rule.id.clone(), true);
                inner.events.push_back(event.clone());
                while inner.events.len() > self.event_capacity {
                    inner.events.pop_front();
                }
                created.push(event);
            } else if !breached && was_active {
                debug!("Alert rule '{}' cleared", rule.name);
                inner.active.insert(rule.id.clone(), false);
            }
        }

        created
    }

    /// Acknowledge an event. Idempotent: a second call returns the event
    /// unchanged. `None` for an unknown event id.
    pub fn acknowledge(&self, event_id: &str) -> Option<AlertEvent> {
        let now = self.clock.wall();
        let mut inner = self.inner.lock().unwrap();
        let event = inner.events.iter_mut().find(|e| e.id == event_id)?;
        if !event.acknowledged {
            event.acknowledged = true;
            event.acknowledged_at = Some(now);
        }
        Some(event.clone())
    }

    /// Events most-recent-first, filtered and capped.
    pub fn list_events(&self, query: &EventQuery) -> Vec<AlertEvent> {
        let limit = query.limit.unwrap_or(self.default_limit);
        let inner = self.inner.lock().unwrap();
        inner
            .events
            .iter()
            .rev()
            .filter(|e| query.include_acknowledged || !e.acknowledged)
            .filter(|e| query.severity.map(|s| e.severity == s).unwrap_or(true))
            .filter(|e| {
                query
                    .rule_id
                    .as_deref()
                    .map(|r| e.rule_id == r)
                    .unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn store() -> (AlertStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (AlertStore::new(&AlertsConfig::default(), clock.clone()), clock)
    }

    fn snap(open: u64, retries: u64) -> CircuitMetricsSnapshot {
        CircuitMetricsSnapshot {
            open_count: open,
            retry_attempts: retries,
            ..Default::default()
        }
    }

    fn sample(clock: &ManualClock, open: u64, retries: u64) -> MetricsSample {
        MetricsSample {
            timestamp: clock.wall(),
            metrics: snap(open, retries),
        }
    }

    // --- Rule CRUD ---

    #[test]
    fn test_add_rule_clamps_inputs() {
        let (store, _) = store();
        let rule = store.add_rule(Some("r".into()), -5, -1, 0, Some("nonsense"));
        assert_eq!(rule.open_threshold, 0);
        assert_eq!(rule.retry_threshold, 0);
        assert_eq!(rule.window_minutes, 1);
        assert_eq!(rule.severity, AlertSeverity::Warning);
        assert!(rule.enabled);
    }

    #[test]
    fn test_add_rule_generates_name() {
        let (store, _) = store();
        let rule = store.add_rule(None, 1, 0, 5, None);
        assert!(rule.name.starts_with("rule-"));
    }

    #[test]
    fn test_severity_normalization() {
        assert_eq!(AlertSeverity::normalize(Some("critical")), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::normalize(Some("CRITICAL")), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::normalize(Some("whatever")), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::normalize(None), AlertSeverity::Warning);
    }

    #[test]
    fn test_list_rules_ordered_by_name() {
        let (store, _) = store();
        store.add_rule(Some("zeta".into()), 1, 0, 5, None);
        store.add_rule(Some("alpha".into()), 1, 0, 5, None);
        let names: Vec<String> = store.list_rules().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_update_rule_partial_and_clamped() {
        let (store, _) = store();
        let rule = store.add_rule(Some("r".into()), 2, 3, 5, Some("critical"));
        let updated = store
            .update_rule(
                &rule.id,
                &RuleUpdate {
                    open_threshold: Some(-1),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.open_threshold, 0);
        assert!(!updated.enabled);
        // Untouched fields preserved.
        assert_eq!(updated.retry_threshold, 3);
        assert_eq!(updated.severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_update_unknown_rule_is_none() {
        let (store, _) = store();
        assert!(store.update_rule("missing", &RuleUpdate::default()).is_none());
    }

    #[test]
    fn test_remove_rule() {
        let (store, _) = store();
        let rule = store.add_rule(Some("r".into()), 1, 0, 5, None);
        assert!(store.remove_rule(&rule.id));
        assert!(!store.remove_rule(&rule.id));
        assert!(store.list_rules().is_empty());
    }

    // --- Evaluation ---

    #[test]
    fn test_no_history_skips_rule() {
        let (store, _) = store();
        store.add_rule(Some("r".into()), 1, 0, 5, None);
        let created = store.evaluate(&snap(100, 0), &[]);
        assert!(created.is_empty());
    }

    #[test]
    fn test_breach_creates_event() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 2, 0, 5, Some("critical"));
        let history = vec![sample(&clock, 0, 0)];
        clock.advance(Duration::from_secs(60));

        let created = store.evaluate(&snap(3, 0), &history);
        assert_eq!(created.len(), 1);
        let event = &created[0];
        assert_eq!(event.open_delta, 3);
        assert_eq!(event.severity, AlertSeverity::Critical);
        assert!(!event.acknowledged);
    }

    #[test]
    fn test_delta_equal_to_threshold_is_not_breach() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 3, 0, 5, None);
        let history = vec![sample(&clock, 0, 0)];
        let created = store.evaluate(&snap(3, 0), &history);
        assert!(created.is_empty());
    }

    #[test]
    fn test_zero_threshold_dimension_disabled() {
        let (store, clock) = store();
        store.add_rule(Some("retries-only".into()), 0, 5, 5, None);
        let history = vec![sample(&clock, 0, 0)];
        // Huge open delta but openThreshold=0: not a breach.
        assert!(store.evaluate(&snap(1000, 0), &history).is_empty());
        // Retry delta over its threshold: breach.
        assert_eq!(store.evaluate(&snap(1000, 6), &history).len(), 1);
    }

    #[test]
    fn test_hysteresis_no_duplicate_while_breached() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 2, 0, 5, None);
        let history = vec![sample(&clock, 0, 0)];

        let first = store.evaluate(&snap(3, 0), &history);
        assert_eq!(first.len(), 1);
        let second = store.evaluate(&snap(3, 0), &history);
        assert!(second.is_empty());
        assert_eq!(store.event_count(), 1);
    }

    #[test]
    fn test_hysteresis_rearms_after_clear() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 2, 0, 60, None);
        let history = vec![sample(&clock, 0, 0)];

        assert_eq!(store.evaluate(&snap(3, 0), &history).len(), 1);

        // Delta back under threshold: clears the latch, no event.
        let later_baseline = vec![sample(&clock, 3, 0)];
        assert!(store.evaluate(&snap(3, 0), &later_baseline).is_empty());

        // Breach again: a fresh event fires.
        assert_eq!(store.evaluate(&snap(7, 0), &later_baseline).len(), 1);
        assert_eq!(store.event_count(), 2);
    }

    #[test]
    fn test_baseline_is_oldest_sample_in_window() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 2, 0, 10, None);

        // Sample outside the window, then two inside it.
        let old = sample(&clock, 0, 0);
        clock.advance(Duration::from_secs(11 * 60));
        let in_window_old = sample(&clock, 4, 0);
        clock.advance(Duration::from_secs(60));
        let in_window_new = sample(&clock, 6, 0);
        let history = vec![old, in_window_old, in_window_new];

        // Baseline must be the 4-opens sample: delta = 7-4 = 3 > 2.
        let created = store.evaluate(&snap(7, 0), &history);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].open_delta, 3);
    }

    #[test]
    fn test_counter_reset_yields_zero_delta() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 1, 0, 5, None);
        // Baseline above current (counters were reset): clamped to 0.
        let history = vec![sample(&clock, 50, 0)];
        assert!(store.evaluate(&snap(2, 0), &history).is_empty());
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let (store, clock) = store();
        let rule = store.add_rule(Some("opens".into()), 1, 0, 5, None);
        store.update_rule(
            &rule.id,
            &RuleUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        );
        let history = vec![sample(&clock, 0, 0)];
        assert!(store.evaluate(&snap(10, 0), &history).is_empty());
    }

    // --- Acknowledgement & listing ---

    #[test]
    fn test_acknowledge_idempotent() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 1, 0, 5, None);
        let history = vec![sample(&clock, 0, 0)];
        let event = store.evaluate(&snap(5, 0), &history).remove(0);

        clock.advance(Duration::from_secs(10));
        let first = store.acknowledge(&event.id).unwrap();
        assert!(first.acknowledged);
        let first_at = first.acknowledged_at.unwrap();

        clock.advance(Duration::from_secs(60));
        let second = store.acknowledge(&event.id).unwrap();
        assert_eq!(second.acknowledged_at.unwrap(), first_at);
        assert_eq!(first, second);
    }

    #[test]
    fn test_acknowledge_unknown_is_none() {
        let (store, _) = store();
        assert!(store.acknowledge("nope").is_none());
    }

    #[test]
    fn test_list_events_hides_acknowledged_by_default() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 1, 0, 5, None);
        let history = vec![sample(&clock, 0, 0)];
        let event = store.evaluate(&snap(5, 0), &history).remove(0);

        assert_eq!(store.list_events(&EventQuery::default()).len(), 1);
        store.acknowledge(&event.id);
        assert!(store.list_events(&EventQuery::default()).is_empty());

        let all = store.list_events(&EventQuery {
            include_acknowledged: true,
            ..Default::default()
        });
        assert_eq!(all.len(), 1);
        assert!(all[0].acknowledged);
    }

    #[test]
    fn test_list_events_filters_and_order() {
        let (store, clock) = store();
        let warn_rule = store.add_rule(Some("warn".into()), 1, 0, 60, Some("warning"));
        let crit_rule = store.add_rule(Some("crit".into()), 0, 1, 60, Some("critical"));
        let history = vec![sample(&clock, 0, 0)];

        clock.advance(Duration::from_secs(1));
        store.evaluate(&snap(5, 0), &history); // warn fires
        clock.advance(Duration::from_secs(1));
        store.evaluate(&snap(5, 5), &history); // crit fires

        let all = store.list_events(&EventQuery {
            include_acknowledged: true,
            ..Default::default()
        });
        // Most recent first.
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].rule_id, crit_rule.id);
        assert_eq!(all[1].rule_id, warn_rule.id);

        let crit_only = store.list_events(&EventQuery {
            severity: Some(AlertSeverity::Critical),
            ..Default::default()
        });
        assert_eq!(crit_only.len(), 1);

        let by_rule = store.list_events(&EventQuery {
            rule_id: Some(warn_rule.id.clone()),
            ..Default::default()
        });
        assert_eq!(by_rule.len(), 1);
        assert_eq!(by_rule[0].rule_id, warn_rule.id);
    }

    #[test]
    fn test_list_events_limit() {
        let (store, clock) = store();
        store.add_rule(Some("opens".into()), 1, 0, 60, None);
        let history = vec![sample(&clock, 0, 0)];

        // Fire, clear, fire... to create several events.
        let mut current = 5;
        for _ in 0..4 {
            store.evaluate(&snap(current, 0), &history);
            store.evaluate(&snap(0, 0), &history); // clears
            current += 5;
        }
        let capped = store.list_events(&EventQuery {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_event_fifo_eviction() {
        let clock = Arc::new(ManualClock::new());
        let cfg = AlertsConfig {
            event_capacity: 2,
            default_event_limit: 50,
        };
        let store = AlertStore::new(&cfg, clock.clone());
        store.add_rule(Some("opens".into()), 1, 0, 60, None);
        let history = vec![sample(&clock, 0, 0)];

        let first = store.evaluate(&snap(5, 0), &history).remove(0);
        store.evaluate(&snap(0, 0), &history);
        // Acknowledged events are evicted like any other.
        store.acknowledge(&first.id);
        store.evaluate(&snap(5, 0), &history);
        store.evaluate(&snap(0, 0), &history);
        store.evaluate(&snap(5, 0), &history);

        assert_eq!(store.event_count(), 2);
        let all = store.list_events(&EventQuery {
            include_acknowledged: true,
            ..Default::default()
        });
        assert!(all.iter().all(|e| e.id != first.id));
    }
}
