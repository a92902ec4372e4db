//! Application-facing API
//!
//! [`ControlSurface`] wires the channel pool, the input router, the GPIO
//! layer and the inbound event queue together. It is built once through
//! [`SurfaceBuilder`]; setup calls then reconfigure slots in place.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::encoder::EncoderSetup;
use crate::error::{ConfigError, SurfaceResult, TransportError};
use crate::gpio::{expander, is_expander_pin, Bank, Edge, ExpanderBus, GpioHal, PinMode, Pull};
use crate::poll::{SwitchPoller, DEFAULT_POLL_INTERVAL};
use crate::pool::ChannelPool;
use crate::queue::{EventConsumer, InboundEvent};
use crate::router::InputRouter;
use crate::sink::EventSink;
use crate::switch::SwitchSetup;

/// Assembles a [`ControlSurface`]
pub struct SurfaceBuilder {
    pool: Arc<ChannelPool>,
    sink: EventSink,
    events: EventConsumer,
    gpio: Arc<dyn GpioHal>,
    expander: Option<Arc<dyn ExpanderBus>>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    poll: bool,
}

impl SurfaceBuilder {
    pub fn new(
        pool: Arc<ChannelPool>,
        sink: EventSink,
        events: EventConsumer,
        gpio: Arc<dyn GpioHal>,
    ) -> Self {
        Self {
            pool,
            sink,
            events,
            gpio,
            expander: None,
            clock: Arc::new(MonotonicClock::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll: true,
        }
    }

    /// Attach an interrupt-capable expander; expander lines are then
    /// dispatched per bank instead of polled
    pub fn expander(mut self, bus: Arc<dyn ExpanderBus>) -> Self {
        self.expander = Some(bus);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Skip the poll thread (expander switches are then only sampled
    /// by explicit scans)
    pub fn without_poller(mut self) -> Self {
        self.poll = false;
        self
    }

    pub fn build(self) -> SurfaceResult<ControlSurface> {
        let router = Arc::new(InputRouter::new(
            self.pool.clone(),
            self.sink,
            self.clock,
            self.gpio.clone(),
            self.expander.clone(),
        ));

        let mut poller = None;
        if let Some(bus) = &self.expander {
            expander::init_expander(bus.as_ref())?;
            for bank in Bank::ALL {
                self.gpio.register_interrupt(
                    bank.interrupt_pin(),
                    Edge::Rising,
                    router.bank_handler(bank),
                )?;
            }
        } else if self.poll {
            poller = Some(SwitchPoller::spawn(router.clone(), self.poll_interval)?);
        }

        log::info!(
            "ControlSurface: {} encoder / {} switch slots, expander {}",
            self.pool.encoder_capacity(),
            self.pool.switch_capacity(),
            if self.expander.is_some() { "on" } else { "off" }
        );

        Ok(ControlSurface {
            pool: self.pool,
            router,
            events: self.events,
            _poller: poller,
        })
    }
}

pub struct ControlSurface {
    pool: Arc<ChannelPool>,
    router: Arc<InputRouter>,
    events: EventConsumer,
    _poller: Option<SwitchPoller>,
}

impl ControlSurface {
    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    pub fn router(&self) -> &Arc<InputRouter> {
        &self.router
    }

    /// Configure switch `slot` on `pin` (0 leaves it unwired)
    pub fn setup_switch(&self, slot: usize, pin: u32) -> SurfaceResult<()> {
        self.pool.setup_switch(slot, SwitchSetup { pin })?;
        if pin == 0 {
            return Ok(());
        }

        let gpio = self.router.gpio();
        gpio.configure_pin(pin, PinMode::Input(Pull::Up))?;
        if !is_expander_pin(pin) {
            gpio.register_interrupt(pin, Edge::Both, self.router.switch_handler(slot))?;
            self.router.on_switch_interrupt(slot);
        } else if self.router.has_expander() {
            self.scan_all_banks();
        }
        Ok(())
    }

    /// Configure encoder `slot`; lines are (re)wired only when they changed
    ///
    /// Rejected with the slot untouched when both lines share a pin, or when
    /// a line is on the expander and no expander is attached.
    pub fn setup_encoder(&self, slot: usize, setup: &EncoderSetup) -> SurfaceResult<()> {
        self.pool.encoder(slot)?;
        if setup.pin_a == setup.pin_b {
            return Err(ConfigError::IdenticalPins(setup.pin_a).into());
        }
        if !self.router.has_expander() {
            if let Some(pin) = [setup.pin_a, setup.pin_b]
                .into_iter()
                .find(|&pin| is_expander_pin(pin))
            {
                return Err(ConfigError::NoExpander(pin).into());
            }
        }

        let rewire = self.pool.setup_encoder(slot, setup)?;
        if !rewire {
            return Ok(());
        }

        let gpio = self.router.gpio();
        for pin in [setup.pin_a, setup.pin_b] {
            gpio.configure_pin(pin, PinMode::Input(Pull::Up))?;
        }

        if is_expander_pin(setup.pin_a) || is_expander_pin(setup.pin_b) {
            self.scan_all_banks();
        } else {
            for pin in [setup.pin_a, setup.pin_b] {
                gpio.register_interrupt(pin, Edge::Both, self.router.encoder_handler(slot))?;
            }
        }
        Ok(())
    }

    fn scan_all_banks(&self) {
        for bank in Bank::ALL {
            if let Err(e) = self.router.on_bank_interrupt(bank) {
                log::warn!("ControlSurface: bank {} scan failed: {}", bank, e);
            }
        }
    }

    pub fn disable_switch(&self, slot: usize) -> Result<(), ConfigError> {
        self.pool.switch(slot)?.disable();
        Ok(())
    }

    pub fn disable_encoder(&self, slot: usize) -> Result<(), ConfigError> {
        self.pool.encoder(slot)?.disable();
        Ok(())
    }

    /// Last release→press interval of `slot` in µs; 0 once read
    pub fn read_switch_duration(&self, slot: usize) -> Result<u64, ConfigError> {
        Ok(self.pool.switch(slot)?.read_duration())
    }

    pub fn encoder_value(&self, slot: usize) -> Result<u32, ConfigError> {
        Ok(self.pool.encoder(slot)?.value())
    }

    /// Override an encoder's value and publish it
    ///
    /// A disabled slot is left untouched. Returns the (clamped) value held.
    pub fn set_encoder_value(&self, slot: usize, value: u32) -> SurfaceResult<u32> {
        let channel = self.pool.encoder(slot)?;
        if !channel.is_enabled() {
            return Ok(channel.value());
        }
        let value = channel.set_value(value);
        self.router.sink().publish(channel)?;
        Ok(value)
    }

    /// Oldest queued inbound event packed as `status | d1 << 8 | d2 << 16`; 0 when empty
    pub fn pop_event(&mut self) -> u32 {
        self.events.pop()
    }

    pub fn next_event(&mut self) -> Option<InboundEvent> {
        self.events.pop_event()
    }

    pub fn send_rpn(&self, chan: u8, rpn: u16, data: u16) -> Result<(), TransportError> {
        self.router.sink().send_rpn(chan, rpn, data)
    }

    pub fn send_nrpn(&self, chan: u8, nrpn: u16, data: u16) -> Result<(), TransportError> {
        self.router.sink().send_nrpn(chan, nrpn, data)
    }

    pub fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError> {
        self.router.sink().send_program_change(chan, program)
    }

    /// Read an expander bank and dispatch changed lines
    pub fn scan_expander_bank(&self, bank: Bank) -> SurfaceResult<usize> {
        self.router.on_bank_interrupt(bank)
    }
}

impl std::fmt::Debug for ControlSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSurface")
            .field("router", &self.router)
            .field("queued_events", &self.events.len())
            .finish_non_exhaustive()
    }
}
