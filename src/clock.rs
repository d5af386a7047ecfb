use core::cell::Cell;

use embassy_time::{Duration, Instant};

/// Source of timestamps for the periodic nodes
pub trait Clock {
    fn now(&self) -> Instant;

    /// Seconds elapsed since `since`
    fn secs_since(&self, since: Instant) -> f32 {
        secs_between(since, self.now())
    }
}

/// Seconds from `earlier` to `later`, zero if `later` comes first
pub fn secs_between(earlier: Instant, later: Instant) -> f32 {
    later
        .checked_duration_since(earlier)
        .map_or(0.0, |elapsed| elapsed.as_micros() as f32 / 1e6)
}

impl<C: Clock> Clock for &C {
    fn now(&self) -> Instant {
        (*self).now()
    }
}

/// Embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
