//! Quadrature decoding, spin acceleration and value mapping for one encoder
//!
//! Each physical line transition feeds the 2-bit phase `(A << 1) | B` into
//! [`EncoderChannel::update`]. The previous and new phase form a 4-bit
//! transition code; only the eight codes a real Gray-code rotation can
//! produce count as ticks, the rest are bounce or skipped states.
//!
//! # Modes
//!
//! - **Smooth** (`step == 0`): ticks move a fixed-point `subvalue` with
//!   [`TICKS_PER_DETENT`] sub-steps per published unit. Spinning fast
//!   moves more sub-steps per tick, so a quick flick covers the range.
//! - **Rigid** (`step > 0`): ticks move `value` by exactly `step`.
//!
//! # Concurrency
//!
//! Every field is an individual atomic accessed with `Ordering::Relaxed`.
//! Interrupt handlers, the poll thread and the audio callback may touch the
//! same slot; the last write to each scalar wins. The next physical tick
//! re-derives everything, so no cross-field ordering is required.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::debug::Bits;

/// Sub-steps per published value unit in smooth mode
pub const TICKS_PER_DETENT: u32 = 4;

/// Transitions closer together than this are contact bounce
pub const DEBOUNCE_US: u64 = 1_000;

/// Mean tick interval below which one tick advances a whole detent
pub const FAST_SPIN_US: u64 = 10_000;

/// Mean tick interval below which one tick advances half a detent
pub const MEDIUM_SPIN_US: u64 = 30_000;

/// Number of past intervals averaged with the current one
pub const INTERVAL_HISTORY: usize = 4;

/// Direction decoded from one phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Up,
    Down,
    /// Bounce or an impossible two-line jump
    Noise,
}

impl Rotation {
    /// Classify the transition from `prev` to `next` (2-bit phases)
    pub fn classify(prev: u8, next: u8) -> Self {
        match ((prev & 0b11) << 2) | (next & 0b11) {
            0b1101 | 0b0100 | 0b0010 | 0b1011 => Rotation::Up,
            0b1110 | 0b0111 | 0b0001 | 0b1000 => Rotation::Down,
            _ => Rotation::Noise,
        }
    }
}

/// Sub-steps per tick for a given mean tick interval
#[inline]
pub fn spin_multiplier(mean_interval_us: u64) -> u32 {
    if mean_interval_us < FAST_SPIN_US {
        TICKS_PER_DETENT
    } else if mean_interval_us < MEDIUM_SPIN_US {
        TICKS_PER_DETENT / 2
    } else {
        1
    }
}

/// Result of feeding one phase sample into a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Slot is disabled
    Disabled,
    /// Transition code is not a rotation step
    Noise,
    /// Too soon after the previous accepted tick
    Debounced,
    /// Tick accepted but the published value did not move
    Unchanged,
    /// Published value moved to the contained value
    Changed(u32),
}

/// Encoder slot configuration, as supplied by setup calls and config files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSetup {
    /// Line A (phase MSB)
    pub pin_a: u32,
    /// Line B (phase LSB)
    pub pin_b: u32,
    /// MIDI channel (0-15)
    #[serde(default)]
    pub midi_chan: u8,
    /// MIDI controller number; 0 publishes over OSC instead
    #[serde(default)]
    pub midi_ctrl: u8,
    /// OSC address used when `midi_ctrl == 0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osc_path: Option<String>,
    /// Initial value
    #[serde(default)]
    pub value: u32,
    /// Upper bound of the published value
    pub max_value: u32,
    /// 0 for smooth mode, otherwise the per-tick increment
    #[serde(default)]
    pub step: u32,
}

/// Per-slot encoder state
#[derive(Debug, Default)]
pub struct EncoderChannel {
    enabled: AtomicBool,
    pin_a: AtomicU32,
    pin_b: AtomicU32,
    midi_chan: AtomicU8,
    midi_ctrl: AtomicU8,
    osc_path: RwLock<Option<String>>,
    value: AtomicU32,
    subvalue: AtomicU32,
    max_value: AtomicU32,
    step: AtomicU32,
    last_phase: AtomicU8,
    /// Last line levels seen by an expander bank scan (bit 1 = A, bit 0 = B)
    pin_levels: AtomicU8,
    last_tick_us: AtomicU64,
    intervals: [AtomicU64; INTERVAL_HISTORY],
}

impl EncoderChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a setup in place and enable the slot
    ///
    /// Out-of-range MIDI channel/controller values are coerced (channel to 0,
    /// controller to 1) and the initial value is clamped to `max_value`.
    /// Returns `true` when the slot was disabled before or its pins changed,
    /// meaning the caller must (re)wire the lines.
    pub fn configure(&self, setup: &EncoderSetup) -> bool {
        let midi_chan = if setup.midi_chan > 15 {
            log::warn!("Encoder: MIDI channel {} out of range, using 0", setup.midi_chan);
            0
        } else {
            setup.midi_chan
        };
        let midi_ctrl = if setup.midi_ctrl > 127 {
            log::warn!("Encoder: MIDI controller {} out of range, using 1", setup.midi_ctrl);
            1
        } else {
            setup.midi_ctrl
        };
        let value = setup.value.min(setup.max_value);

        self.midi_chan.store(midi_chan, Ordering::Relaxed);
        self.midi_ctrl.store(midi_ctrl, Ordering::Relaxed);
        let osc_path = setup.osc_path.clone().filter(|p| !p.is_empty());
        match self.osc_path.write() {
            Ok(mut path) => *path = osc_path,
            Err(poisoned) => *poisoned.into_inner() = osc_path,
        }
        self.step.store(setup.step, Ordering::Relaxed);
        self.max_value.store(setup.max_value, Ordering::Relaxed);
        self.value.store(value, Ordering::Relaxed);
        let subvalue = if setup.step == 0 {
            value.saturating_mul(TICKS_PER_DETENT)
        } else {
            0
        };
        self.subvalue.store(subvalue, Ordering::Relaxed);

        let rewire = !self.is_enabled()
            || self.pin_a.load(Ordering::Relaxed) != setup.pin_a
            || self.pin_b.load(Ordering::Relaxed) != setup.pin_b;
        if rewire {
            self.pin_a.store(setup.pin_a, Ordering::Relaxed);
            self.pin_b.store(setup.pin_b, Ordering::Relaxed);
            self.last_phase.store(0, Ordering::Relaxed);
            self.last_tick_us.store(0, Ordering::Relaxed);
            self.enabled.store(true, Ordering::Relaxed);
        }
        rewire
    }

    /// Stop processing this slot; storage stays in place
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Feed a newly sampled 2-bit phase taken at `now_us`
    pub fn update(&self, phase: u8, now_us: u64) -> TickOutcome {
        if !self.is_enabled() {
            return TickOutcome::Disabled;
        }

        let phase = phase & 0b11;
        let prev = self.last_phase.swap(phase, Ordering::Relaxed);
        let rotation = Rotation::classify(prev, phase);
        log::trace!(
            "Encoder: {} -> {} ({:?})",
            Bits::new(prev as u32, 2),
            Bits::new(phase as u32, 2),
            rotation
        );
        if rotation == Rotation::Noise {
            return TickOutcome::Noise;
        }

        let elapsed = now_us.saturating_sub(self.last_tick_us.load(Ordering::Relaxed));
        if elapsed < DEBOUNCE_US {
            return TickOutcome::Debounced;
        }
        let multiplier = self.record_interval(elapsed);
        self.last_tick_us.store(now_us, Ordering::Relaxed);

        let current = self.value.load(Ordering::Relaxed);
        let max_value = self.max_value.load(Ordering::Relaxed);
        let step = self.step.load(Ordering::Relaxed);

        let next = if step == 0 {
            let sub_max = max_value.saturating_mul(TICKS_PER_DETENT);
            let sub = self.subvalue.load(Ordering::Relaxed).min(sub_max);
            if rotation == Rotation::Up {
                let sub = sub.saturating_add(multiplier).min(sub_max);
                self.subvalue.store(sub, Ordering::Relaxed);
                sub / TICKS_PER_DETENT
            } else {
                let sub = sub.saturating_sub(multiplier);
                self.subvalue.store(sub, Ordering::Relaxed);
                // Ceiling so a decrement never leaves the display one unit high
                sub.div_ceil(TICKS_PER_DETENT)
            }
        } else {
            let value = current.min(max_value);
            if rotation == Rotation::Up {
                value.saturating_add(step).min(max_value)
            } else {
                value.saturating_sub(step)
            }
        };

        if next == current {
            return TickOutcome::Unchanged;
        }
        self.value.store(next, Ordering::Relaxed);
        TickOutcome::Changed(next)
    }

    /// Push `elapsed` into the interval history and return the spin multiplier
    fn record_interval(&self, elapsed: u64) -> u32 {
        let mut sum = elapsed;
        for slot in &self.intervals {
            sum = sum.saturating_add(slot.load(Ordering::Relaxed));
        }
        let mean = sum / (INTERVAL_HISTORY as u64 + 1);

        for i in 0..INTERVAL_HISTORY - 1 {
            let newer = self.intervals[i + 1].load(Ordering::Relaxed);
            self.intervals[i].store(newer, Ordering::Relaxed);
        }
        self.intervals[INTERVAL_HISTORY - 1].store(elapsed, Ordering::Relaxed);

        spin_multiplier(mean)
    }

    /// Programmatic override; returns the clamped value now held
    pub fn set_value(&self, value: u32) -> u32 {
        let max_value = self.max_value.load(Ordering::Relaxed);
        let value = if self.step.load(Ordering::Relaxed) == 0 {
            let sub = value
                .saturating_mul(TICKS_PER_DETENT)
                .min(max_value.saturating_mul(TICKS_PER_DETENT));
            self.subvalue.store(sub, Ordering::Relaxed);
            sub / TICKS_PER_DETENT
        } else {
            value.min(max_value)
        };
        self.value.store(value, Ordering::Relaxed);
        value
    }

    /// Snap to a value received from an external controller, without publishing
    pub fn sync_from_control_change(&self, data: u8) {
        let value = (data as u32).min(self.max_value.load(Ordering::Relaxed));
        self.value.store(value, Ordering::Relaxed);
        if self.step.load(Ordering::Relaxed) == 0 {
            self.subvalue
                .store(value * TICKS_PER_DETENT, Ordering::Relaxed);
        }
    }

    /// Whether an inbound Control-Change on `chan`/`ctrl` addresses this slot
    #[inline]
    pub fn listens_to(&self, chan: u8, ctrl: u8) -> bool {
        self.is_enabled()
            && self.midi_chan.load(Ordering::Relaxed) == chan
            && self.midi_ctrl.load(Ordering::Relaxed) == ctrl
    }

    /// Run `f` with the configured OSC path
    pub fn with_osc_path<R>(&self, f: impl FnOnce(Option<&str>) -> R) -> R {
        match self.osc_path.read() {
            Ok(path) => f(path.as_deref()),
            Err(poisoned) => f(poisoned.into_inner().as_deref()),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn subvalue(&self) -> u32 {
        self.subvalue.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn max_value(&self) -> u32 {
        self.max_value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn step(&self) -> u32 {
        self.step.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn midi_chan(&self) -> u8 {
        self.midi_chan.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn midi_ctrl(&self) -> u8 {
        self.midi_ctrl.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn last_phase(&self) -> u8 {
        self.last_phase.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn last_tick_us(&self) -> u64 {
        self.last_tick_us.load(Ordering::Relaxed)
    }

    /// Pins as `(a, b)`
    pub fn pins(&self) -> (u32, u32) {
        (
            self.pin_a.load(Ordering::Relaxed),
            self.pin_b.load(Ordering::Relaxed),
        )
    }

    /// Line levels last seen by an expander bank scan, as `(a, b)`
    pub fn pin_levels(&self) -> (bool, bool) {
        let levels = self.pin_levels.load(Ordering::Relaxed);
        (levels & 0b10 != 0, levels & 0b01 != 0)
    }

    pub fn set_pin_levels(&self, a: bool, b: bool) {
        self.pin_levels
            .store(((a as u8) << 1) | b as u8, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth(value: u32, max_value: u32) -> EncoderChannel {
        let ch = EncoderChannel::new();
        ch.configure(&EncoderSetup {
            pin_a: 4,
            pin_b: 5,
            midi_chan: 0,
            midi_ctrl: 7,
            osc_path: None,
            value,
            max_value,
            step: 0,
        });
        ch
    }

    fn rigid(value: u32, max_value: u32, step: u32) -> EncoderChannel {
        let ch = EncoderChannel::new();
        ch.configure(&EncoderSetup {
            pin_a: 4,
            pin_b: 5,
            midi_chan: 0,
            midi_ctrl: 7,
            osc_path: None,
            value,
            max_value,
            step,
        });
        ch
    }

    /// Next phase in the clockwise sequence 11 -> 01 -> 00 -> 10 -> 11
    fn phase_up(phase: u8) -> u8 {
        match phase {
            0b11 => 0b01,
            0b01 => 0b00,
            0b00 => 0b10,
            _ => 0b11,
        }
    }

    /// Next phase in the counter-clockwise sequence 11 -> 10 -> 00 -> 01 -> 11
    fn phase_down(phase: u8) -> u8 {
        match phase {
            0b11 => 0b10,
            0b10 => 0b00,
            0b00 => 0b01,
            _ => 0b11,
        }
    }

    /// Feed `ticks` rotation steps spaced `spacing_us` apart, starting after `start_us`
    fn spin(ch: &EncoderChannel, up: bool, ticks: usize, start_us: u64, spacing_us: u64) -> u64 {
        let mut now = start_us;
        for _ in 0..ticks {
            now += spacing_us;
            let phase = if up {
                phase_up(ch.last_phase())
            } else {
                phase_down(ch.last_phase())
            };
            ch.update(phase, now);
        }
        now
    }

    #[test]
    fn test_transition_table_counts() {
        let mut up = 0;
        let mut down = 0;
        let mut noise = 0;
        for prev in 0..4u8 {
            for next in 0..4u8 {
                match Rotation::classify(prev, next) {
                    Rotation::Up => up += 1,
                    Rotation::Down => down += 1,
                    Rotation::Noise => noise += 1,
                }
            }
        }
        assert_eq!((up, down, noise), (4, 4, 8));
    }

    #[test]
    fn test_sequences_classify_consistently() {
        let mut phase = 0b11;
        for _ in 0..8 {
            let next = phase_up(phase);
            assert_eq!(Rotation::classify(phase, next), Rotation::Up);
            phase = next;
        }
        for _ in 0..8 {
            let next = phase_down(phase);
            assert_eq!(Rotation::classify(phase, next), Rotation::Down);
            phase = next;
        }
        // Both lines flipping at once is not a valid step
        assert_eq!(Rotation::classify(0b00, 0b11), Rotation::Noise);
        assert_eq!(Rotation::classify(0b01, 0b01), Rotation::Noise);
    }

    #[test]
    fn test_spin_multiplier_thresholds() {
        assert_eq!(spin_multiplier(9_999), TICKS_PER_DETENT);
        assert_eq!(spin_multiplier(10_000), TICKS_PER_DETENT / 2);
        assert_eq!(spin_multiplier(29_999), TICKS_PER_DETENT / 2);
        assert_eq!(spin_multiplier(30_000), 1);
    }

    #[test]
    fn test_fast_spin_moves_a_detent_per_tick() {
        let ch = smooth(10, 100);
        let mut now = 0;
        for _ in 0..4 {
            let before = ch.subvalue();
            now = spin(&ch, true, 1, now, 5_000);
            assert_eq!(ch.subvalue(), before + TICKS_PER_DETENT);
        }
        assert_eq!(ch.value(), 14);
    }

    #[test]
    fn test_slow_spin_moves_one_substep_per_tick() {
        let ch = smooth(10, 100);
        // Cold history still averages in zeros, so the first ticks run faster
        let now = spin(&ch, true, 4, 0, 50_000);
        assert_eq!(ch.value(), 11);

        let start_sub = ch.subvalue();
        let start_value = ch.value();
        let mut now = now;
        for i in 1..=4 {
            now = spin(&ch, true, 1, now, 50_000);
            assert_eq!(ch.subvalue(), start_sub + i);
        }
        assert_eq!(ch.value(), start_value + 1);
    }

    #[test]
    fn test_bounce_is_discarded_without_side_effects() {
        let ch = smooth(10, 100);
        spin(&ch, true, 1, 0, 5_000);
        let sub = ch.subvalue();
        let value = ch.value();
        let stamp = ch.last_tick_us();

        let phase = phase_up(ch.last_phase());
        assert_eq!(ch.update(phase, stamp + 500), TickOutcome::Debounced);
        assert_eq!(ch.subvalue(), sub);
        assert_eq!(ch.value(), value);
        assert_eq!(ch.last_tick_us(), stamp);
    }

    #[test]
    fn test_noise_is_ignored() {
        let ch = smooth(10, 100);
        assert_eq!(ch.update(0b11, 50_000), TickOutcome::Noise);
        assert_eq!(ch.value(), 10);
        assert_eq!(ch.last_tick_us(), 0);
    }

    #[test]
    fn test_up_then_down_returns_to_start() {
        let ch = smooth(20, 100);
        let now = spin(&ch, true, 7, 0, 5_000);
        assert_eq!(ch.value(), 27);
        spin(&ch, false, 7, now, 5_000);
        assert_eq!(ch.value(), 20);
        assert_eq!(ch.subvalue(), 80);
    }

    #[test]
    fn test_decrement_rounds_up() {
        let ch = smooth(10, 100);
        // 40 - 2 - 1 - 1 - 1 as the history fills with slow intervals
        spin(&ch, false, 4, 0, 100_000);
        assert_eq!(ch.subvalue(), 35);
        assert_eq!(ch.value(), 9);
    }

    #[test]
    fn test_bounds_hold_under_arbitrary_sequences() {
        let ch = smooth(3, 12);
        let mut seed: u32 = 0x1234_5678;
        let mut now = 0u64;
        for _ in 0..5_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let phase = ((seed >> 16) & 0b11) as u8;
            now += ((seed >> 8) & 0x7FFF) as u64;
            ch.update(phase, now);
            assert!(ch.value() <= 12);
            assert!(ch.subvalue() <= 12 * TICKS_PER_DETENT);
        }
    }

    #[test]
    fn test_smooth_mode_clamps_at_both_ends() {
        let ch = smooth(1, 2);
        let now = spin(&ch, true, 10, 0, 5_000);
        assert_eq!(ch.value(), 2);
        assert_eq!(ch.subvalue(), 8);
        spin(&ch, false, 10, now, 5_000);
        assert_eq!(ch.value(), 0);
        assert_eq!(ch.subvalue(), 0);
    }

    #[test]
    fn test_rigid_mode_steps_and_clamps() {
        let ch = rigid(120, 127, 8);
        assert_eq!(ch.update(phase_up(ch.last_phase()), 5_000), TickOutcome::Changed(127));
        assert_eq!(ch.update(phase_up(ch.last_phase()), 10_000), TickOutcome::Unchanged);
        assert_eq!(ch.update(phase_down(ch.last_phase()), 15_000), TickOutcome::Changed(119));
        assert_eq!(ch.subvalue(), 0);

        let low = rigid(3, 127, 8);
        assert_eq!(low.update(phase_down(low.last_phase()), 5_000), TickOutcome::Changed(0));
    }

    #[test]
    fn test_disabled_slot_ignores_ticks() {
        let ch = smooth(5, 10);
        ch.disable();
        assert_eq!(ch.update(0b10, 5_000), TickOutcome::Disabled);
        assert_eq!(ch.value(), 5);
    }

    #[test]
    fn test_configure_coerces_and_reports_rewire() {
        let ch = EncoderChannel::new();
        let mut setup = EncoderSetup {
            pin_a: 1,
            pin_b: 2,
            midi_chan: 20,
            midi_ctrl: 200,
            osc_path: Some("/x".into()),
            value: 50,
            max_value: 10,
            step: 0,
        };
        assert!(ch.configure(&setup));
        assert_eq!(ch.midi_chan(), 0);
        assert_eq!(ch.midi_ctrl(), 1);
        assert_eq!(ch.value(), 10);
        assert_eq!(ch.subvalue(), 40);

        // Same pins: no rewiring needed
        setup.value = 3;
        assert!(!ch.configure(&setup));
        assert_eq!(ch.value(), 3);

        setup.pin_b = 3;
        assert!(ch.configure(&setup));
        assert_eq!(ch.pins(), (1, 3));
    }

    #[test]
    fn test_set_value_scales_and_clamps() {
        let ch = smooth(0, 100);
        assert_eq!(ch.set_value(42), 42);
        assert_eq!(ch.subvalue(), 168);
        assert_eq!(ch.set_value(500), 100);
        assert_eq!(ch.subvalue(), 400);

        let r = rigid(0, 64, 4);
        assert_eq!(r.set_value(70), 64);
    }

    #[test]
    fn test_sync_from_control_change_snaps_both_fields() {
        let ch = smooth(0, 127);
        ch.sync_from_control_change(99);
        assert_eq!(ch.value(), 99);
        assert_eq!(ch.subvalue(), 99 * TICKS_PER_DETENT);

        let small = smooth(0, 10);
        small.sync_from_control_change(99);
        assert_eq!(small.value(), 10);
    }

    #[test]
    fn test_listens_to_requires_enabled_and_match() {
        let ch = smooth(0, 127);
        assert!(ch.listens_to(0, 7));
        assert!(!ch.listens_to(1, 7));
        ch.disable();
        assert!(!ch.listens_to(0, 7));
    }
}
