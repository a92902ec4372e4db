//! Debounced switch state with release-to-press interval tracking
//!
//! A switch records the time of its last release. When it closes again the
//! gap since that release is stored in `dtus` until the application reads
//! it (clear-on-read). This is the release→press interval, not a hold time:
//! callers use it to tell quick re-presses from slow ones.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::encoder::DEBOUNCE_US;

/// Switch slot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchSetup {
    /// GPIO line; 0 leaves the slot enabled but unwired
    pub pin: u32,
}

/// Result of feeding one sampled level into a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Disabled,
    /// Level equals the current status
    Unchanged,
    /// Edge arrived within the debounce window and was dropped
    Bounce,
    /// Accepted transition to 1; carries the interval since the last release
    Closed(Option<u64>),
    /// Accepted transition to 0
    Opened,
}

/// Per-slot switch state
#[derive(Debug, Default)]
pub struct SwitchChannel {
    enabled: AtomicBool,
    pin: AtomicU32,
    status: AtomicU8,
    has_edge: AtomicBool,
    last_edge_us: AtomicU64,
    has_release: AtomicBool,
    released_at_us: AtomicU64,
    dtus: AtomicU64,
}

impl SwitchChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the slot onto `pin` and enable it
    pub fn configure(&self, setup: SwitchSetup) {
        self.pin.store(setup.pin, Ordering::Relaxed);
        self.status.store(0, Ordering::Relaxed);
        self.has_edge.store(false, Ordering::Relaxed);
        self.last_edge_us.store(0, Ordering::Relaxed);
        self.has_release.store(false, Ordering::Relaxed);
        self.released_at_us.store(0, Ordering::Relaxed);
        self.dtus.store(0, Ordering::Relaxed);
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Feed the line level sampled at `now_us`
    pub fn update(&self, closed: bool, now_us: u64) -> SwitchOutcome {
        if !self.is_enabled() {
            return SwitchOutcome::Disabled;
        }
        let status = closed as u8;
        if status == self.status.load(Ordering::Relaxed) {
            return SwitchOutcome::Unchanged;
        }

        if self.has_edge.load(Ordering::Relaxed) {
            let elapsed = now_us.saturating_sub(self.last_edge_us.load(Ordering::Relaxed));
            if elapsed < DEBOUNCE_US {
                return SwitchOutcome::Bounce;
            }
        }
        self.has_edge.store(true, Ordering::Relaxed);
        self.last_edge_us.store(now_us, Ordering::Relaxed);
        self.status.store(status, Ordering::Relaxed);

        if closed {
            let interval = self.has_release.load(Ordering::Relaxed).then(|| {
                now_us.saturating_sub(self.released_at_us.load(Ordering::Relaxed))
            });
            if let Some(dtus) = interval {
                self.dtus.store(dtus, Ordering::Relaxed);
            }
            SwitchOutcome::Closed(interval)
        } else {
            self.released_at_us.store(now_us, Ordering::Relaxed);
            self.has_release.store(true, Ordering::Relaxed);
            SwitchOutcome::Opened
        }
    }

    /// Take the last release→press interval in µs, leaving 0 behind
    pub fn read_duration(&self) -> u64 {
        self.dtus.swap(0, Ordering::Relaxed)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin.load(Ordering::Relaxed)
    }

    /// Current debounced level
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.status.load(Ordering::Relaxed) == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch() -> SwitchChannel {
        let sw = SwitchChannel::new();
        sw.configure(SwitchSetup { pin: 17 });
        sw
    }

    #[test]
    fn test_release_then_press_interval_read_once() {
        let sw = switch();
        assert_eq!(sw.update(true, 10_000), SwitchOutcome::Closed(None));
        assert_eq!(sw.update(false, 20_000), SwitchOutcome::Opened);
        assert_eq!(sw.update(true, 70_000), SwitchOutcome::Closed(Some(50_000)));

        assert_eq!(sw.read_duration(), 50_000);
        assert_eq!(sw.read_duration(), 0);
    }

    #[test]
    fn test_first_press_has_no_interval() {
        let sw = switch();
        sw.update(true, 5_000);
        assert_eq!(sw.read_duration(), 0);
        assert!(sw.is_closed());
    }

    #[test]
    fn test_bounce_is_dropped() {
        let sw = switch();
        sw.update(true, 10_000);
        sw.update(false, 20_000);
        assert_eq!(sw.update(true, 20_400), SwitchOutcome::Bounce);
        assert!(!sw.is_closed());
        assert_eq!(sw.read_duration(), 0);

        // A settled press afterwards still measures from the release
        assert_eq!(sw.update(true, 30_000), SwitchOutcome::Closed(Some(10_000)));
    }

    #[test]
    fn test_same_level_is_a_no_op() {
        let sw = switch();
        assert_eq!(sw.update(false, 1_000), SwitchOutcome::Unchanged);
        sw.update(true, 2_000);
        assert_eq!(sw.update(true, 9_000), SwitchOutcome::Unchanged);
    }

    #[test]
    fn test_disabled_switch_ignores_edges() {
        let sw = switch();
        sw.disable();
        assert_eq!(sw.update(true, 5_000), SwitchOutcome::Disabled);
        assert!(!sw.is_closed());
    }

    #[test]
    fn test_configure_resets_state() {
        let sw = switch();
        sw.update(true, 10_000);
        sw.update(false, 20_000);
        sw.update(true, 40_000);
        sw.configure(SwitchSetup { pin: 22 });
        assert_eq!(sw.pin(), 22);
        assert!(!sw.is_closed());
        assert_eq!(sw.read_duration(), 0);
    }
}
