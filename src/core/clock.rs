//! Time source used by every deadline and sleep

use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock with a sleep primitive
///
/// `now` is measured from an arbitrary origin; only differences are meaningful.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Real clock running `factor` times faster than wall time
///
/// All threads sharing one `ScaledClock` see the same accelerated timeline,
/// which lets tests exercise minute-long deadlines in milliseconds.
#[derive(Debug, Clone)]
pub struct ScaledClock {
    origin: Instant,
    factor: u32,
}

impl ScaledClock {
    pub fn new(factor: u32) -> Self {
        Self {
            origin: Instant::now(),
            factor: factor.max(1),
        }
    }
}

impl Clock for ScaledClock {
    fn now(&self) -> Duration {
        self.origin.elapsed() * self.factor
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration / self.factor);
    }
}
