//! Monotonic microsecond time sources
//!
//! Debounce and acceleration only need differences between readings, so
//! every clock reports microseconds since an arbitrary fixed origin.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic timestamps in microseconds
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;
}

/// Wall-clock implementation backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
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
    #[inline]
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Manually driven clock for tests and the emulator
///
/// Shared between threads; every reading returns whatever was last set.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, us: u64) {
        self.now.store(us, Ordering::Relaxed);
    }

    /// Move time forward and return the new reading
    pub fn advance(&self, us: u64) -> u64 {
        self.now.fetch_add(us, Ordering::Relaxed) + us
    }

    pub fn advance_ms(&self, ms: u64) -> u64 {
        self.advance(ms * 1000)
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
