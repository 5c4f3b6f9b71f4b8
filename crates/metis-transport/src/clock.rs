//! Monotonic tick source (spec.md §2, "Clock & Dispatcher"). `metis-core`
//! is clock-agnostic — every table takes a `Tick` as a plain argument — so
//! this is the one place a wall clock actually gets read.

use std::time::{Duration, Instant};

use metis_core::Tick;

/// Converts wall-clock elapsed time into the `Tick` unit the forwarding
/// tables speak. Ticks never run backwards and never overflow in any
/// realistic process lifetime.
#[derive(Debug, Clone)]
pub struct Clock {
    epoch: Instant,
    tick_duration: Duration,
}

impl Clock {
    pub fn new(tick_duration: Duration) -> Self {
        Self { epoch: Instant::now(), tick_duration }
    }

    /// Current tick, computed from elapsed wall time. `tick_duration` is
    /// assumed nonzero; callers construct it from a config value the
    /// daemon validates at startup.
    pub fn now(&self) -> Tick {
        (self.epoch.elapsed().as_nanos() / self.tick_duration.as_nanos()) as Tick
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Converts a duration (e.g. a config-supplied lifetime) into the
    /// matching number of ticks.
    pub fn to_ticks(&self, duration: Duration) -> Tick {
        (duration.as_nanos() / self.tick_duration.as_nanos()) as Tick
    }
}

impl Default for Clock {
    /// One tick per millisecond: fine enough for Interest lifetimes
    /// (typically hundreds to thousands of milliseconds) without making
    /// the PIT's `BTreeMap<Tick, _>` expiry index needlessly dense.
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_advance_monotonically() {
        let clock = Clock::default();
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn to_ticks_matches_tick_duration() {
        let clock = Clock::new(Duration::from_millis(10));
        assert_eq!(clock.to_ticks(Duration::from_millis(100)), 10);
    }
}
