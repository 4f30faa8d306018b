// src/clock.rs
//
// Scheduling epoch.
//
// The signal graph owns the real clock; the scheduling core only ever reads
// it through `Clock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of the current time in seconds.
pub trait Clock: Send + Sync {
    fn current_time(&self) -> f64;
}

/// Clock advanced by hand. Used by offline rendering and tests.
///
/// The time is stored as f64 bits in an atomic so it can be advanced from
/// one thread and read from another.
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(time: f64) -> Self {
        Self {
            bits: AtomicU64::new(time.to_bits()),
        }
    }

    pub fn set(&self, time: f64) {
        self.bits.store(time.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.current_time() + seconds);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clock for ManualClock {
    #[inline]
    fn current_time(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
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
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1.5);
        assert_eq!(clock.current_time(), 1.5);
        clock.advance(0.25);
        assert_eq!(clock.current_time(), 1.75);
        clock.set(0.0);
        assert_eq!(clock.current_time(), 0.0);
    }

    #[test]
    fn test_system_clock_is_monotone() {
        let clock = SystemClock::new();
        let a = clock.current_time();
        let b = clock.current_time();
        assert!(a >= 0.0 && b >= a);
    }
}
