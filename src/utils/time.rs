// src/utils/time.rs
//! Session clock and time providers

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Time provider trait for dependency injection and testing
pub trait TimeProvider: Send + Sync {
    /// Time elapsed since the provider's origin
    fn elapsed(&self) -> Duration;

    /// Block the caller for `duration` of this provider's time
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Monotonic provider backed by `Instant`
pub struct MonotonicTimeProvider {
    origin: Instant,
}

impl MonotonicTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MonotonicTimeProvider {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Mock time provider for deterministic testing
pub struct MockTimeProvider {
    current: Mutex<Duration>,
}

impl MockTimeProvider {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance_by(&self, delta: Duration) {
        *self.current.lock() += delta;
    }

    pub fn set_time(&self, at: Duration) {
        *self.current.lock() = at;
    }
}

impl Default for MockTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MockTimeProvider {
    fn elapsed(&self) -> Duration {
        *self.current.lock()
    }

    /// Returns immediately with the clock moved forward
    fn sleep(&self, duration: Duration) {
        self.advance_by(duration);
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for std::sync::Arc<T> {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Host-side sample clock.
///
/// Each block is stamped as a linear ramp `start + i / rate`. The start of a
/// block is the end of the previous one, unless the wall clock has already
/// moved past it, in which case the ramp jumps forward. Time never rewinds.
pub struct SessionClock {
    provider: Box<dyn TimeProvider>,
    sample_period_s: f64,
    origin_s: f64,
    next_start_s: f64,
}

impl SessionClock {
    pub fn new(sampling_rate_hz: f64, provider: Box<dyn TimeProvider>) -> Self {
        let origin_s = provider.elapsed().as_secs_f64();
        Self {
            provider,
            sample_period_s: 1.0 / sampling_rate_hz,
            origin_s,
            next_start_s: 0.0,
        }
    }

    pub fn monotonic(sampling_rate_hz: f64) -> Self {
        Self::new(sampling_rate_hz, Box::new(MonotonicTimeProvider::new()))
    }

    /// Restart at zero from the provider's current time
    pub fn reset(&mut self) {
        self.origin_s = self.provider.elapsed().as_secs_f64();
        self.next_start_s = 0.0;
    }

    /// Seconds since the last reset
    pub fn now_s(&self) -> f64 {
        self.provider.elapsed().as_secs_f64() - self.origin_s
    }

    /// Timestamps for the next `count` samples
    pub fn ramp(&mut self, count: usize) -> Vec<f64> {
        let start = self.next_start_s.max(self.now_s());
        let stamps: Vec<f64> = (0..count)
            .map(|i| start + i as f64 * self.sample_period_s)
            .collect();
        self.next_start_s = start + count as f64 * self.sample_period_s;
        stamps
    }

    /// Timestamp the next block will start at, if it is not late
    pub fn next_start_s(&self) -> f64 {
        self.next_start_s
    }

    /// Wait until the clock reaches the start of the next block.
    ///
    /// Returns false without waiting if that is further away than `timeout`.
    pub fn wait_for_next_start(&self, timeout: Duration) -> bool {
        let ahead_s = self.next_start_s - self.now_s();
        if ahead_s <= 0.0 {
            return true;
        }

        let ahead = Duration::from_secs_f64(ahead_s);
        if ahead > timeout {
            return false;
        }
        self.provider.sleep(ahead);
        true
    }
}
