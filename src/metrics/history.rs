//! Bounded, time-windowed history of metrics snapshots.
//!
//! A polling loop appends one sample per tick; dashboards and the alert
//! evaluator read windows of it. Eviction runs on every add: age first, then
//! count, oldest-first. A single coarse lock keeps concurrent add/snapshot
//! simple and correct.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::schema::HistoryConfig;
use crate::metrics::store::CircuitMetricsSnapshot;

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub metrics: CircuitMetricsSnapshot,
}

/// Bounded ring of periodic metrics samples.
pub struct HistoryStore {
    samples: Mutex<VecDeque<MetricsSample>>,
    window: chrono::Duration,
    max_samples: usize,
    clock: Arc<dyn Clock>,
}

impl HistoryStore {
    pub fn new(config: &HistoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            window: chrono::Duration::minutes(config.window_minutes as i64),
            max_samples: config.max_samples.max(1),
            clock,
        }
    }

    /// Append a sample stamped with the current wall time, then evict.
    pub fn add(&self, metrics: CircuitMetricsSnapshot) {
        let now = self.clock.wall();
        let mut samples = self.samples.lock().unwrap();
        samples.push_back(MetricsSample {
            timestamp: now,
            metrics,
        });

        // Age eviction, then count eviction, oldest-first.
        let cutoff = now - self.window;
        while samples.front().map(|s| s.timestamp < cutoff).unwrap_or(false) {
            samples.pop_front();
        }
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    /// Samples ordered by timestamp, optionally narrowed to the trailing
    /// `window` and capped at the most recent `limit` entries.
    pub fn snapshot(&self, window: Option<Duration>, limit: Option<usize>) -> Vec<MetricsSample> {
        let samples = self.samples.lock().unwrap();
        let mut out: Vec<MetricsSample> = match window {
            Some(w) => {
                let cutoff = self.clock.wall()
                    - chrono::Duration::from_std(w).unwrap_or_else(|_| chrono::Duration::zero());
                samples
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            }
            None => samples.iter().cloned().collect(),
        };
        if let Some(limit) = limit {
            if out.len() > limit {
                // Keep the most recent entries, never the oldest.
                out.drain(..out.len() - limit);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.samples.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store(window_minutes: u64, max_samples: usize) -> (HistoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cfg = HistoryConfig {
            window_minutes,
            max_samples,
        };
        (HistoryStore::new(&cfg, clock.clone()), clock)
    }

    fn sample_with_opens(n: u64) -> CircuitMetricsSnapshot {
        CircuitMetricsSnapshot {
            open_count: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_and_read_back() {
        let (store, _) = store(60, 300);
        store.add(sample_with_opens(1));
        let samples = store.snapshot(None, None);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metrics.open_count, 1);
    }

    #[test]
    fn test_count_eviction_drops_oldest() {
        let (store, clock) = store(60, 3);
        for i in 0..4 {
            store.add(sample_with_opens(i));
            clock.advance(Duration::from_secs(1));
        }
        let samples = store.snapshot(None, None);
        assert_eq!(samples.len(), 3);
        // Sample 0 was dropped; 1..=3 remain oldest-first.
        let opens: Vec<u64> = samples.iter().map(|s| s.metrics.open_count).collect();
        assert_eq!(opens, vec![1, 2, 3]);
    }

    #[test]
    fn test_age_eviction() {
        let (store, clock) = store(1, 300);
        store.add(sample_with_opens(1));
        clock.advance(Duration::from_secs(90));
        store.add(sample_with_opens(2));
        let samples = store.snapshot(None, None);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metrics.open_count, 2);
    }

    #[test]
    fn test_timestamps_monotonic() {
        let (store, clock) = store(60, 300);
        for i in 0..5 {
            store.add(sample_with_opens(i));
            clock.advance(Duration::from_secs(10));
        }
        let samples = store.snapshot(None, None);
        for pair in samples.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_snapshot_window_filter() {
        let (store, clock) = store(60, 300);
        store.add(sample_with_opens(1));
        clock.advance(Duration::from_secs(600));
        store.add(sample_with_opens(2));

        let recent = store.snapshot(Some(Duration::from_secs(300)), None);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].metrics.open_count, 2);

        let all = store.snapshot(None, None);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_snapshot_limit_keeps_most_recent() {
        let (store, clock) = store(60, 300);
        for i in 0..5 {
            store.add(sample_with_opens(i));
            clock.advance(Duration::from_secs(1));
        }
        let capped = store.snapshot(None, Some(2));
        let opens: Vec<u64> = capped.iter().map(|s| s.metrics.open_count).collect();
        assert_eq!(opens, vec![3, 4]);
    }

    #[test]
    fn test_clear() {
        let (store, _) = store(60, 300);
        store.add(sample_with_opens(1));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_add_and_snapshot() {
        let clock = Arc::new(ManualClock::new());
        let cfg = HistoryConfig {
            window_minutes: 60,
            max_samples: 100,
        };
        let store = Arc::new(HistoryStore::new(&cfg, clock));

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.add(sample_with_opens(i));
                }
            })
        };
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let samples = store.snapshot(None, None);
                    assert!(samples.len() <= 100);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();

        assert_eq!(store.len(), 100);
    }
}
