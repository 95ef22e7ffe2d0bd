//! Wall-clock sources for the blocks that relate stream time to host time.

use crate::time_spec::TimeSpec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Host clock readable from any thread.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_ns(&self) -> u64;

    /// Seconds since the Unix epoch.
    fn now_secs_f64(&self) -> f64 {
        let ns = self.now_ns();
        (ns / 1_000_000_000) as f64 + (ns % 1_000_000_000) as f64 / 1e9
    }

    /// Current time split into whole and fractional seconds.
    fn now_time_spec(&self) -> TimeSpec {
        let ns = self.now_ns();
        TimeSpec::new(ns / 1_000_000_000, (ns % 1_000_000_000) as f64 / 1e9)
    }
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct MockClock {
    current_ns: AtomicU64,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_ns(ns: u64) -> Self {
        Self {
            current_ns: AtomicU64::new(ns),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.current_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set_time_ns(&self, ns: u64) {
        self.current_ns.store(ns, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ns(&self) -> u64 {
        self.current_ns.load(Ordering::SeqCst)
    }
}
