//! Injectable clock — monotonic + wall-clock reads behind one trait.
//!
//! Everything in this crate that measures elapsed time or stamps samples goes
//! through a [`Clock`] so that state machines and eviction logic can be driven
//! deterministically in tests. Production code uses [`SystemClock`]; tests use
//! [`ManualClock`] and advance it by hand.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant, for elapsed-time accounting.
    fn now(&self) -> Instant;
    /// Wall-clock timestamp, for anything that crosses the API boundary.
    fn wall(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-advanced clock for deterministic tests.
///
/// Both reads are anchored at construction time; `advance` moves the monotonic
/// and wall views together.
pub struct ManualClock {
    base: Instant,
    wall_base: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            wall_base: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock().unwrap();
        *offset += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock().unwrap();
        self.wall_base + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
