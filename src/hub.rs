//! Diagnostics hub: binds circuit breakers to the metrics and history stores
//! and exposes one snapshot surface for external callers.
//!
//! The hub is an explicitly-constructed, long-lived instance handed by
//! reference to whoever needs it (HTTP handlers, CLI commands, panels) —
//! never ambient global state. Measurement flows one way: breaker transition
//! events are forwarded into the global store; each external `snapshot` call
//! doubles as a history tick.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::breaker::CircuitBreaker;
use crate::clock::Clock;
use crate::config::schema::Config;
use crate::metrics::history::HistoryStore;
use crate::metrics::store::{CircuitMetricsSnapshot, MetricsStore};

/// Process-wide registry of resilience measurements.
pub struct DiagnosticsHub {
    global: Arc<MetricsStore>,
    tools: RwLock<HashMap<String, Arc<MetricsStore>>>,
    history: HistoryStore,
    attached: Mutex<HashSet<String>>,
    clock: Arc<dyn Clock>,
}

impl DiagnosticsHub {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            global: Arc::new(MetricsStore::new()),
            tools: RwLock::new(HashMap::new()),
            history: HistoryStore::new(&config.history, clock.clone()),
            attached: Mutex::new(HashSet::new()),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Subscribe to a breaker's transitions, forwarding them to the global
    /// store. Attaching the same breaker twice is a no-op.
    pub fn attach(&self, breaker: &CircuitBreaker) {
        {
            let mut attached = self.attached.lock().unwrap();
            if !attached.insert(breaker.id().to_string()) {
                return;
            }
        }
        let store = Arc::clone(&self.global);
        breaker.on_transition(Arc::new(move |t| {
            store.record_state_change(t.previous, t.current);
        }));
    }

    /// Count a retry attempt globally and, when a tool id is given, against
    /// that tool's store too.
    pub fn record_retry_attempt(&self, tool_id: Option<&str>) {
        self.global.record_retry_attempt();
        if let Some(tool) = tool_id {
            self.tool_store(tool).record_retry_attempt();
        }
    }

    /// Count a circuit-open occurrence globally and, when a tool id is given,
    /// against that tool's store too.
    pub fn record_circuit_open(&self, tool_id: Option<&str>) {
        self.global.record_circuit_open();
        if let Some(tool) = tool_id {
            self.tool_store(tool).record_circuit_open();
        }
    }

    /// Read the global counters. Each read is also a history tick: the
    /// resulting snapshot is appended to the history store.
    pub fn snapshot(&self) -> CircuitMetricsSnapshot {
        let snap = self.global.snapshot();
        self.history.add(snap);
        snap
    }

    /// Read the global counters without touching history.
    pub fn peek(&self) -> CircuitMetricsSnapshot {
        self.global.snapshot()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn tool_snapshot(&self, tool_id: &str) -> Option<CircuitMetricsSnapshot> {
        self.tools
            .read()
            .unwrap()
            .get(tool_id)
            .map(|s| s.snapshot())
    }

    /// Known tool ids, sorted.
    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Per-tool snapshots, sorted by tool id.
    pub fn tool_snapshots(&self) -> Vec<(String, CircuitMetricsSnapshot)> {
        let tools = self.tools.read().unwrap();
        let mut out: Vec<(String, CircuitMetricsSnapshot)> = tools
            .iter()
            .map(|(id, store)| (id.clone(), store.snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Clear the global store, all per-tool stores, and the history.
    pub fn reset(&self) {
        // Holding the tools write lock makes the wipe atomic for callers
        // going through the hub.
        let mut tools = self.tools.write().unwrap();
        self.global.reset();
        tools.clear();
        self.history.clear();
        info!("Resilience metrics reset");
    }

    fn tool_store(&self, tool_id: &str) -> Arc<MetricsStore> {
        if let Some(store) = self.tools.read().unwrap().get(tool_id) {
            return Arc::clone(store);
        }
        let mut tools = self.tools.write().unwrap();
        Arc::clone(
            tools
                .entry(tool_id.to_string())
                .or_insert_with(|| Arc::new(MetricsStore::new())),
        )
    }
}
