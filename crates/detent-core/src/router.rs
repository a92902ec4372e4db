//! Entry point for every hardware event
//!
//! Interrupt handlers and the poll thread all land here with a slot id (or
//! an expander bank). The router samples the clock once per event, drives
//! the channel state machine and publishes value changes through the
//! [`EventSink`].

use std::sync::Arc;

use crate::clock::Clock;
use crate::encoder::{EncoderChannel, TickOutcome};
use crate::error::{ConfigError, SurfaceResult};
use crate::gpio::{expander, is_expander_pin, Bank, ExpanderBus, GpioHal, InterruptHandler};
use crate::pool::ChannelPool;
use crate::sink::EventSink;
use crate::switch::SwitchOutcome;

pub struct InputRouter {
    pool: Arc<ChannelPool>,
    sink: EventSink,
    clock: Arc<dyn Clock>,
    gpio: Arc<dyn GpioHal>,
    expander: Option<Arc<dyn ExpanderBus>>,
}

impl InputRouter {
    pub fn new(
        pool: Arc<ChannelPool>,
        sink: EventSink,
        clock: Arc<dyn Clock>,
        gpio: Arc<dyn GpioHal>,
        expander: Option<Arc<dyn ExpanderBus>>,
    ) -> Self {
        Self {
            pool,
            sink,
            clock,
            gpio,
            expander,
        }
    }

    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn gpio(&self) -> &Arc<dyn GpioHal> {
        &self.gpio
    }

    pub fn has_expander(&self) -> bool {
        self.expander.is_some()
    }

    /// Feed sampled line levels to an encoder slot
    pub fn encoder_tick(&self, slot: usize, a: bool, b: bool) -> TickOutcome {
        let Ok(channel) = self.pool.encoder(slot) else {
            return TickOutcome::Disabled;
        };
        let phase = (a as u8) << 1 | b as u8;
        let outcome = channel.update(phase, self.clock.now_us());
        match outcome {
            TickOutcome::Changed(value) => {
                log::trace!("Router: encoder {} -> {}", slot, value);
                self.publish(slot, channel);
            }
            TickOutcome::Debounced => log::trace!("Router: encoder {} debounced", slot),
            _ => {}
        }
        outcome
    }

    /// Feed a sampled switch level
    pub fn switch_edge(&self, slot: usize, level: bool) -> SwitchOutcome {
        let Ok(switch) = self.pool.switch(slot) else {
            return SwitchOutcome::Disabled;
        };
        let outcome = switch.update(level, self.clock.now_us());
        match outcome {
            SwitchOutcome::Bounce => log::trace!("Router: switch {} bounce", slot),
            SwitchOutcome::Closed(Some(dtus)) => {
                log::debug!("Router: switch {} closed after {} us", slot, dtus)
            }
            _ => {}
        }
        outcome
    }

    fn publish(&self, slot: usize, channel: &EncoderChannel) {
        if let Err(e) = self.sink.publish(channel) {
            log::warn!("Router: encoder {} publish failed: {}", slot, e);
        }
    }

    /// Interrupt path for a native encoder line
    pub fn on_encoder_interrupt(&self, slot: usize) {
        let Ok(channel) = self.pool.encoder(slot) else {
            return;
        };
        let (pin_a, pin_b) = channel.pins();
        let a = self.gpio.read_pin(pin_a);
        let b = self.gpio.read_pin(pin_b);
        self.encoder_tick(slot, a, b);
    }

    /// Interrupt path for a native switch line
    pub fn on_switch_interrupt(&self, slot: usize) {
        let Ok(switch) = self.pool.switch(slot) else {
            return;
        };
        let level = self.gpio.read_pin(switch.pin());
        self.switch_edge(slot, level);
    }

    /// Interrupt path for an expander bank: read its port and dispatch
    pub fn on_bank_interrupt(&self, bank: Bank) -> SurfaceResult<usize> {
        let bus = self
            .expander
            .as_ref()
            .ok_or(ConfigError::NoExpander(bank.base_pin()))?;
        let register = expander::read_bank(bus.as_ref(), bank)?;
        Ok(self.scan_bank(bank, register))
    }

    /// Dispatch every enabled channel with a line in `bank` whose level
    /// differs from what was last seen. Returns the number dispatched.
    pub fn scan_bank(&self, bank: Bank, register: u8) -> usize {
        let mut dispatched = 0;

        for (slot, channel) in self.pool.enabled_encoders() {
            let (pin_a, pin_b) = channel.pins();
            let (last_a, last_b) = channel.pin_levels();
            let a = bank.level(register, pin_a);
            let b = bank.level(register, pin_b);
            if a.is_none() && b.is_none() {
                continue;
            }
            let a = a.unwrap_or(last_a);
            let b = b.unwrap_or(last_b);
            if (a, b) != (last_a, last_b) {
                self.encoder_tick(slot, a, b);
                channel.set_pin_levels(a, b);
                dispatched += 1;
            }
        }

        for (slot, switch) in self.pool.enabled_switches() {
            let Some(level) = bank.level(register, switch.pin()) else {
                continue;
            };
            if level != switch.is_closed() {
                self.switch_edge(slot, level);
                dispatched += 1;
            }
        }

        dispatched
    }

    /// Sample every enabled switch on an expander line (poll thread path)
    pub fn poll_expander_switches(&self) -> usize {
        let mut dispatched = 0;
        for (slot, switch) in self.pool.enabled_switches() {
            let pin = switch.pin();
            if !is_expander_pin(pin) {
                continue;
            }
            let level = self.gpio.read_pin(pin);
            if level != switch.is_closed() {
                self.switch_edge(slot, level);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Handler bound to one encoder slot
    pub fn encoder_handler(self: &Arc<Self>, slot: usize) -> InterruptHandler {
        let router = Arc::clone(self);
        Box::new(move || router.on_encoder_interrupt(slot))
    }

    /// Handler bound to one switch slot
    pub fn switch_handler(self: &Arc<Self>, slot: usize) -> InterruptHandler {
        let router = Arc::clone(self);
        Box::new(move || router.on_switch_interrupt(slot))
    }

    /// Handler bound to one expander bank
    pub fn bank_handler(self: &Arc<Self>, bank: Bank) -> InterruptHandler {
        let router = Arc::clone(self);
        Box::new(move || {
            if let Err(e) = router.on_bank_interrupt(bank) {
                log::warn!("Router: bank {} scan failed: {}", bank, e);
            }
        })
    }
}

impl std::fmt::Debug for InputRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputRouter")
            .field("pool", &self.pool)
            .field("sink", &self.sink)
            .field("expander", &self.expander.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::encoder::EncoderSetup;
    use crate::gpio::EmulatedGpio;
    use crate::sink::testing::{init_logger, RecordingMidi, Sent};
    use crate::switch::SwitchSetup;

    struct Fixture {
        router: Arc<InputRouter>,
        clock: Arc<ManualClock>,
        gpio: Arc<EmulatedGpio>,
        midi: Arc<RecordingMidi>,
    }

    fn fixture(with_expander: bool) -> Fixture {
        init_logger();
        let pool = Arc::new(ChannelPool::new());
        let midi = Arc::new(RecordingMidi::default());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let gpio = Arc::new(EmulatedGpio::new());
        let expander: Option<Arc<dyn ExpanderBus>> = if with_expander {
            Some(gpio.clone())
        } else {
            None
        };
        let router = Arc::new(InputRouter::new(
            pool,
            EventSink::new(midi.clone(), None),
            clock.clone(),
            gpio.clone(),
            expander,
        ));
        Fixture {
            router,
            clock,
            gpio,
            midi,
        }
    }

    fn rigid(pin_a: u32, pin_b: u32) -> EncoderSetup {
        EncoderSetup {
            pin_a,
            pin_b,
            midi_chan: 0,
            midi_ctrl: 20,
            osc_path: None,
            value: 10,
            max_value: 127,
            step: 1,
        }
    }

    #[test]
    fn test_changed_tick_is_published() {
        let fx = fixture(false);
        fx.router.pool().setup_encoder(0, &rigid(5, 6)).unwrap();

        // 00 -> 10 is a clockwise tick
        let outcome = fx.router.encoder_tick(0, true, false);
        assert_eq!(outcome, TickOutcome::Changed(11));
        assert_eq!(fx.midi.messages(), vec![Sent::Cc(0, 20, 11)]);

        // Same clock reading: debounced, nothing published
        assert_eq!(fx.router.encoder_tick(0, true, true), TickOutcome::Debounced);
        assert_eq!(fx.midi.messages().len(), 1);
    }

    #[test]
    fn test_native_interrupt_handler_reads_lines() {
        let fx = fixture(false);
        fx.router.pool().setup_encoder(1, &rigid(5, 6)).unwrap();
        let handler = fx.router.encoder_handler(1);

        fx.gpio.set_level(5, true);
        handler();
        fx.clock.advance_ms(5);
        fx.gpio.set_level(6, true);
        handler();

        assert_eq!(fx.router.pool().encoder(1).unwrap().value(), 12);
    }

    #[test]
    fn test_bank_scan_dispatches_changed_lines_only() {
        let fx = fixture(true);
        let pool = fx.router.pool();
        pool.setup_encoder(0, &rigid(100, 101)).unwrap();
        pool.setup_switch(0, SwitchSetup { pin: 104 }).unwrap();
        pool.setup_switch(1, SwitchSetup { pin: 112 }).unwrap();

        // Line A (bit 0) high, switch on bit 4 closed
        assert_eq!(fx.router.scan_bank(Bank::A, 0b0001_0001), 2);
        assert_eq!(pool.encoder(0).unwrap().value(), 11);
        assert!(pool.switch(0).unwrap().is_closed());
        assert!(!pool.switch(1).unwrap().is_closed());

        // Nothing changed
        assert_eq!(fx.router.scan_bank(Bank::A, 0b0001_0001), 0);
        // Bank B holds only the second switch
        assert_eq!(fx.router.scan_bank(Bank::B, 0b0001_0000), 1);
        assert!(pool.switch(1).unwrap().is_closed());
    }

    #[test]
    fn test_bank_interrupt_reads_expander_port() {
        let fx = fixture(true);
        fx.router
            .pool()
            .setup_switch(2, SwitchSetup { pin: 109 })
            .unwrap();
        fx.gpio.poke_register(expander::reg::GPIOB, 0b0000_0010);
        assert_eq!(fx.router.on_bank_interrupt(Bank::B).unwrap(), 1);
        assert!(fx.router.pool().switch(2).unwrap().is_closed());
    }

    #[test]
    fn test_bank_interrupt_without_expander_fails() {
        let fx = fixture(false);
        assert!(fx.router.on_bank_interrupt(Bank::A).is_err());
    }

    #[test]
    fn test_poll_reads_expander_switches() {
        let fx = fixture(false);
        let pool = fx.router.pool();
        pool.setup_switch(0, SwitchSetup { pin: 103 }).unwrap();
        pool.setup_switch(1, SwitchSetup { pin: 7 }).unwrap();
        fx.gpio.set_level(103, true);
        fx.gpio.set_level(7, true);

        assert_eq!(fx.router.poll_expander_switches(), 1);
        assert!(pool.switch(0).unwrap().is_closed());
        // Native lines are left to their interrupt
        assert!(!pool.switch(1).unwrap().is_closed());
    }
}
