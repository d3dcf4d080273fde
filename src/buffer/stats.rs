//! Cursor statistics tracking.

use std::fmt;

/// Counters kept by one cursor.
///
/// A cursor is owned by a single logical process, so these are plain
/// counters rather than atomics; [`CursorStats`] is `Copy` and doubles as its
/// own snapshot.
///
/// # Example
/// ```
/// use cursorcache::CursorStats;
///
/// let mut stats = CursorStats::default();
/// stats.buffer_hits += 3;
/// stats.round_trips += 1;
/// assert_eq!(stats.hit_rate(), 0.75);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorStats {
    /// Calls issued to the remote cursor.
    pub round_trips: u64,

    /// Navigation and select requests answered from the buffer alone.
    pub buffer_hits: u64,

    /// Remote fetches that filled the buffer.
    pub refills: u64,

    /// Rows received by those fetches.
    pub rows_fetched: u64,

    /// Times the remote cursor was repositioned to match the buffer.
    pub syncs: u64,

    /// Proposable calls evaluated against the local schema replica.
    pub local_proposals: u64,
}

impl CursorStats {
    /// Fraction of requests served without a round trip (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.buffer_hits + self.round_trips;
        if total == 0 {
            0.0
        } else {
            self.buffer_hits as f64 / total as f64
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for CursorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CursorStats {{ round_trips: {}, buffer_hits: {}, refills: {}, rows: {}, hit_rate: {:.2}% }}",
            self.round_trips,
            self.buffer_hits,
            self.refills,
            self.rows_fetched,
            self.hit_rate() * 100.0
        )
    }
}
