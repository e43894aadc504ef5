use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Strictly increasing microsecond timestamps.
///
/// Wall-clock time is used while it moves forward; ties and backwards steps
/// are bumped to one microsecond past the last issued value.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start above `floor`, typically the newest timestamp already stored.
    pub fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    pub fn next_micros(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();
        let mut previous = self.last.load(Ordering::Acquire);
        loop {
            let candidate = wall.max(previous.saturating_add(1));
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}

pub fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}
