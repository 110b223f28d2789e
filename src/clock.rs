//! Wall-clock abstraction.
//!
//! Pool expiry, cooldown windows, and health bookkeeping all compare against
//! "now". Routing that single read through a trait keeps the time-driven
//! transitions testable without real waiting.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current wall-clock instant.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
///
/// # Example
///
/// ```rust
/// use sms_pool::clock::{Clock, ManualClock};
/// use chrono::{Duration, Utc};
///
/// let clock = ManualClock::new(Utc::now());
/// let start = clock.now();
/// clock.advance(Duration::hours(24));
/// assert_eq!(clock.now() - start, Duration::hours(24));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.lock() = to;
    }

    /// Advance the clock by a delta.
    pub fn advance(&self, by: Duration) {
        let mut current = self.lock();
        *current += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}
