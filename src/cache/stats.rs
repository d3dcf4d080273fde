//! Schema cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one [`CacheCoordinator`](super::CacheCoordinator).
///
/// All fields are atomic and updated with `Ordering::Relaxed`: the counters
/// are independent of each other and of the data they describe.
#[derive(Debug)]
pub struct CacheStats {
    /// Full replica rebuilds performed by `ensure_consistent`.
    pub rebuilds: AtomicU64,

    /// Wait handles created because the pool was empty.
    pub wait_handles_allocated: AtomicU64,

    /// Wait handles taken from the pool or shared with an existing waiter.
    pub wait_handles_reused: AtomicU64,

    /// Cache lock acquisitions that timed out.
    pub lock_timeouts: AtomicU64,

    /// Client timestamp waits that timed out.
    pub serialization_timeouts: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            rebuilds: AtomicU64::new(0),
            wait_handles_allocated: AtomicU64::new(0),
            wait_handles_reused: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            serialization_timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-atomic copy for display and assertions.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            wait_handles_allocated: self.wait_handles_allocated.load(Ordering::Relaxed),
            wait_handles_reused: self.wait_handles_reused.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            serialization_timeouts: self.serialization_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.rebuilds.store(0, Ordering::Relaxed);
        self.wait_handles_allocated.store(0, Ordering::Relaxed);
        self.wait_handles_reused.store(0, Ordering::Relaxed);
        self.lock_timeouts.store(0, Ordering::Relaxed);
        self.serialization_timeouts.store(0, Ordering::Relaxed);
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub rebuilds: u64,
    pub wait_handles_allocated: u64,
    pub wait_handles_reused: u64,
    pub lock_timeouts: u64,
    pub serialization_timeouts: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of wait registrations served without allocating (0.0 to 1.0).
    pub fn handle_reuse_rate(&self) -> f64 {
        let total = self.wait_handles_allocated + self.wait_handles_reused;
        if total == 0 {
            0.0
        } else {
            self.wait_handles_reused as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ rebuilds: {}, handles: {} allocated / {} reused, timeouts: {} lock / {} serialization }}",
            self.rebuilds,
            self.wait_handles_allocated,
            self.wait_handles_reused,
            self.lock_timeouts,
            self.serialization_timeouts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = CacheStats::new();
        CacheStats::bump(&stats.rebuilds);
        CacheStats::bump(&stats.wait_handles_allocated);
        stats.wait_handles_reused.fetch_add(3, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rebuilds, 1);
        assert_eq!(snapshot.handle_reuse_rate(), 0.75);
    }

    #[test]
    fn test_stats_reset() {
        let stats = CacheStats::new();
        stats.lock_timeouts.fetch_add(4, Ordering::Relaxed);
        stats.reset();
        assert_eq!(stats.snapshot(), CacheStatsSnapshot::default());
    }

    #[test]
    fn test_stats_display() {
        let stats = CacheStats::new();
        CacheStats::bump(&stats.serialization_timeouts);
        let display = format!("{}", stats.snapshot());
        assert!(display.contains("rebuilds: 0"));
        assert!(display.contains("1 serialization"));
    }
}
