//! Watermarks: totally ordered timestamps for cache invalidation.
//!
//! Wall-clock time alone cannot order an `expire()` against a cache fill that
//! happen within the same clock tick. A watermark pairs the wall-clock
//! observation with a process-wide sequence number, and comparisons use the
//! sequence only.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// A point in the invalidation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    /// Strictly increasing across the process.
    pub sequence: u64,
    /// When this watermark was taken.
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    /// Take a new watermark, later than every watermark taken before it.
    pub fn now() -> Self {
        Self {
            sequence: SEQUENCE.fetch_add(1, Ordering::SeqCst),
            observed_at: Utc::now(),
        }
    }

    /// The beginning of time; older than any watermark from [`Watermark::now`].
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Check if this watermark is newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}
