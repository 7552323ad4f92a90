use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Epoch-millisecond clock whose readings strictly increase.
#[derive(Debug)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.after(None)
    }

    /// Next reading, also strictly after `floor` when given.
    pub fn after(&self, floor: Option<i64>) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let next = |prev: i64| {
            let mut candidate = wall.max(prev.saturating_add(1));
            if let Some(floor) = floor {
                candidate = candidate.max(floor.saturating_add(1));
            }
            candidate
        };

        // The closure always returns Some, so this never fails
        let prev = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(next(prev)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        next(prev)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
