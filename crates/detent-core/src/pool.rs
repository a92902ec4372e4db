//! Preallocated storage for every encoder and switch slot
//!
//! The pool is created once at startup and shared (`Arc<ChannelPool>`)
//! between interrupt handlers, the poll thread, the audio callback and the
//! application. Slots are addressed by index; setup reconfigures a slot in
//! place and nothing is ever reallocated.

use crate::encoder::{EncoderChannel, EncoderSetup};
use crate::error::ConfigError;
use crate::switch::{SwitchChannel, SwitchSetup};

/// Default number of encoder slots
pub const MAX_ENCODERS: usize = 4;

/// Default number of switch slots
pub const MAX_SWITCHES: usize = 8;

/// Fixed-capacity channel storage
#[derive(Debug)]
pub struct ChannelPool {
    encoders: Box<[EncoderChannel]>,
    switches: Box<[SwitchChannel]>,
}

impl ChannelPool {
    /// Pool with the default slot counts
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENCODERS, MAX_SWITCHES)
    }

    pub fn with_capacity(encoders: usize, switches: usize) -> Self {
        Self {
            encoders: (0..encoders).map(|_| EncoderChannel::new()).collect(),
            switches: (0..switches).map(|_| SwitchChannel::new()).collect(),
        }
    }

    pub fn encoder_capacity(&self) -> usize {
        self.encoders.len()
    }

    pub fn switch_capacity(&self) -> usize {
        self.switches.len()
    }

    pub fn encoder(&self, slot: usize) -> Result<&EncoderChannel, ConfigError> {
        self.encoders.get(slot).ok_or(ConfigError::SlotOutOfRange {
            kind: "encoder",
            slot,
            capacity: self.encoders.len(),
        })
    }

    pub fn switch(&self, slot: usize) -> Result<&SwitchChannel, ConfigError> {
        self.switches.get(slot).ok_or(ConfigError::SlotOutOfRange {
            kind: "switch",
            slot,
            capacity: self.switches.len(),
        })
    }

    /// Enabled encoders with their slot ids
    pub fn enabled_encoders(&self) -> impl Iterator<Item = (usize, &EncoderChannel)> {
        self.encoders
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.is_enabled())
    }

    /// Enabled switches with their slot ids
    pub fn enabled_switches(&self) -> impl Iterator<Item = (usize, &SwitchChannel)> {
        self.switches
            .iter()
            .enumerate()
            .filter(|(_, sw)| sw.is_enabled())
    }

    /// Configure an encoder slot; returns whether its lines need (re)wiring
    pub fn setup_encoder(&self, slot: usize, setup: &EncoderSetup) -> Result<bool, ConfigError> {
        let rewire = self.encoder(slot)?.configure(setup);
        log::debug!(
            "Pool: encoder {} -> pins {}/{}, ch {} cc {}, value {}/{} step {}",
            slot,
            setup.pin_a,
            setup.pin_b,
            setup.midi_chan,
            setup.midi_ctrl,
            setup.value,
            setup.max_value,
            setup.step
        );
        Ok(rewire)
    }

    pub fn setup_switch(&self, slot: usize, setup: SwitchSetup) -> Result<(), ConfigError> {
        self.switch(slot)?.configure(setup);
        log::debug!("Pool: switch {} -> pin {}", slot, setup.pin);
        Ok(())
    }

    /// Snap every encoder listening on `chan`/`ctrl` to `data`
    ///
    /// Called from the audio callback: walks the fixed slot array, no
    /// allocation. Returns the number of slots updated.
    pub fn sync_from_control_change(&self, chan: u8, ctrl: u8, data: u8) -> usize {
        let mut matched = 0;
        for ch in self.encoders.iter() {
            if ch.listens_to(chan, ctrl) {
                ch.sync_from_control_change(data);
                matched += 1;
            }
        }
        matched
    }
}

impl Default for ChannelPool {
    fn default() -> Self {
        Self::new()
    }
}
