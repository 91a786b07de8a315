//! Wall-clock timestamps that never run backwards.

use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds since the Unix epoch, clamped to be non-decreasing.
///
/// Wall clocks can step backwards (NTP corrections, manual changes); records
/// formatted later must never carry an earlier timestamp.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn now_millis(&self) -> i64 {
        self.observe(chrono::Utc::now().timestamp_millis())
    }

    pub(crate) fn observe(&self, wall: i64) -> i64 {
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }
}
