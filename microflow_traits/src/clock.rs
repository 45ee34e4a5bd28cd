use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for device loops, dispense timing and sequence delays.
///
/// - now(): returns a monotonic Instant
/// - sleep(): suspends the caller for the provided duration (implementations may simulate)
/// - ms_since(): helper to compute elapsed milliseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Suspend until `deadline`; returns at once if it has already passed.
    fn sleep_until(&self, deadline: Instant) {
        self.sleep(deadline.saturating_duration_since(self.now()));
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Clock handle shared between a device and its background loop.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Convenience constructor for the shared form used across the workspace.
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time only moves when advanced.
///
/// now() = origin + offset
/// sleep(d) advances internal time by d without actually sleeping, so long
/// dispenses and sequence delays complete instantly while still being observable.
/// sleep_until(t) only moves time forward to t, so overlapping waits that share
/// a start cost the longest of them, as they would in real time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Move the clock forward to `deadline`; earlier deadlines are no-ops.
    pub fn advance_to(&self, deadline: Instant) {
        let target = deadline.saturating_duration_since(self.origin);
        if let Ok(mut off) = self.offset.lock() {
            *off = (*off).max(target);
        }
    }

    /// Total simulated time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn sleep_until(&self, deadline: Instant) {
        self.advance_to(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_without_waiting() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let wall = Instant::now();
        clock.sleep(Duration::from_secs(30));
        assert!(wall.elapsed() < Duration::from_secs(1));
        assert_eq!(clock.ms_since(t0), 30_000);
    }

    #[test]
    fn manual_clock_overlapping_waits_cost_the_longest() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep_until(start + Duration::from_secs(10));
        clock.sleep_until(start + Duration::from_secs(4));
        clock.sleep_until(start + Duration::from_secs(7));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
        // a later wait still moves time on from where it started
        let next = clock.now();
        clock.sleep_until(next + Duration::from_secs(2));
        assert_eq!(clock.elapsed(), Duration::from_secs(12));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance(Duration::from_millis(250));
        assert_eq!(b.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn monotonic_zero_sleep_returns_immediately() {
        let clock = MonotonicClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::ZERO);
        assert!(clock.ms_since(t0) < 50);
    }
}
