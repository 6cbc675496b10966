//! Timestamp sources for capture and extraction
//!
//! Every producer stamps its data from one shared clock so that video and
//! audio live in a single tick domain. The tick rate is fixed for the life
//! of the clock; windowing arithmetic never touches wall-clock dates.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Nanosecond tick rate used by [`MonotonicClock`] and [`ManualClock`].
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A monotonic timestamp source with a fixed tick rate.
///
/// `now_ticks()` must be non-decreasing across threads. All rings compare
/// and window timestamps in ticks from one shared instance.
pub trait Clock: Send + Sync {
    /// Current timestamp in ticks.
    fn now_ticks(&self) -> i64;

    /// Ticks per second, fixed for the life of the clock.
    fn ticks_per_second(&self) -> i64;

    /// Convert a tick delta to seconds.
    fn ticks_to_seconds(&self, delta: i64) -> f64 {
        delta as f64 / self.ticks_per_second() as f64
    }

    /// Convert seconds to a tick delta.
    fn seconds_to_ticks(&self, seconds: f64) -> i64 {
        (seconds * self.ticks_per_second() as f64).round() as i64
    }
}

/// Process clock backed by `Instant`.
///
/// Ticks are nanoseconds since clock creation. `Instant` is monotonic on
/// every supported platform, so readings never go backwards across threads.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ticks(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }

    fn ticks_per_second(&self) -> i64 {
        NANOS_PER_SECOND
    }
}

/// Caller-driven clock for tests and deterministic replay.
///
/// Shares the nanosecond tick rate of [`MonotonicClock`] but only advances
/// when told to, which lets extraction run against a virtual "now".
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            ticks: AtomicI64::new(0),
        }
    }

    pub fn set_ticks(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn advance_ticks(&self, delta: i64) {
        self.ticks.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn advance_seconds(&self, seconds: f64) {
        self.advance_ticks(self.seconds_to_ticks(seconds));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> i64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn ticks_per_second(&self) -> i64 {
        NANOS_PER_SECOND
    }
}
