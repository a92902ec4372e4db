//! In-memory GPIO and expander for development hosts and tests
//!
//! Line levels are set from the outside with [`EmulatedGpio::set_level`].
//! A level change on a native pin calls its registered handler on the
//! caller's thread, standing in for interrupt context. A change on an
//! expander line updates the bank's port register and, when the line has
//! its interrupt enabled, pulses the bank's interrupt pin.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::expander::reg;
use super::{is_expander_pin, Bank, Edge, ExpanderBus, GpioHal, InterruptHandler, PinMode};
use crate::error::ConfigError;

/// Quadrature phases in clockwise order starting from both lines low
const GRAY_CYCLE: [u8; 4] = [0b00, 0b10, 0b11, 0b01];

const REGISTER_COUNT: usize = reg::GPIOB as usize + 1;

type SharedHandler = Arc<dyn Fn() + Send + Sync + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct EmulatedGpio {
    levels: Mutex<HashMap<u32, bool>>,
    modes: Mutex<HashMap<u32, PinMode>>,
    handlers: Mutex<HashMap<u32, (Edge, SharedHandler)>>,
    registers: Mutex<[u8; REGISTER_COUNT]>,
}

impl EmulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive `pin` to `level`, firing whatever a real board would fire
    pub fn set_level(&self, pin: u32, level: bool) {
        if let Some(bank) = Bank::of_pin(pin) {
            self.set_expander_level(bank, pin, level);
            return;
        }

        let previous = lock(&self.levels).insert(pin, level).unwrap_or(false);
        if previous == level {
            return;
        }
        let handler = lock(&self.handlers)
            .get(&pin)
            .filter(|(edge, _)| edge.fires_on(level))
            .map(|(_, handler)| handler.clone());
        if let Some(handler) = handler {
            handler();
        }
    }

    fn set_expander_level(&self, bank: Bank, pin: u32, level: bool) {
        let bit = 1u8 << (pin - bank.base_pin());
        let interrupt_enabled = {
            let mut regs = lock(&self.registers);
            let port = bank.gpio_register() as usize;
            let before = regs[port];
            regs[port] = if level { before | bit } else { before & !bit };
            let enable_reg = match bank {
                Bank::A => reg::GPINTENA,
                Bank::B => reg::GPINTENB,
            };
            before != regs[port] && regs[enable_reg as usize] & bit != 0
        };

        if interrupt_enabled {
            let int_pin = bank.interrupt_pin();
            self.set_level(int_pin, true);
            self.set_level(int_pin, false);
        }
    }

    /// Advance the encoder on `pin_a`/`pin_b` by one quadrature transition
    pub fn step_encoder(&self, pin_a: u32, pin_b: u32, clockwise: bool) {
        let phase = (self.read_pin(pin_a) as u8) << 1 | self.read_pin(pin_b) as u8;
        let index = GRAY_CYCLE.iter().position(|&p| p == phase).unwrap_or(0);
        let next = if clockwise {
            GRAY_CYCLE[(index + 1) % 4]
        } else {
            GRAY_CYCLE[(index + 3) % 4]
        };
        if (next ^ phase) & 0b10 != 0 {
            self.set_level(pin_a, next & 0b10 != 0);
        } else {
            self.set_level(pin_b, next & 0b01 != 0);
        }
    }

    /// Mode last set for `pin`
    pub fn mode(&self, pin: u32) -> Option<PinMode> {
        lock(&self.modes).get(&pin).copied()
    }

    pub fn has_handler(&self, pin: u32) -> bool {
        lock(&self.handlers).contains_key(&pin)
    }

    /// Raw register write, bypassing side effects
    pub fn poke_register(&self, register: u8, value: u8) {
        if let Some(slot) = lock(&self.registers).get_mut(register as usize) {
            *slot = value;
        }
    }

    pub fn peek_register(&self, register: u8) -> u8 {
        lock(&self.registers)
            .get(register as usize)
            .copied()
            .unwrap_or(0)
    }
}

impl GpioHal for EmulatedGpio {
    fn configure_pin(&self, pin: u32, mode: PinMode) -> Result<(), ConfigError> {
        lock(&self.modes).insert(pin, mode);
        log::trace!("EmulatedGpio: pin {} -> {:?}", pin, mode);
        Ok(())
    }

    fn read_pin(&self, pin: u32) -> bool {
        match Bank::of_pin(pin) {
            Some(bank) => {
                let port = self.peek_register(bank.gpio_register());
                bank.level(port, pin).unwrap_or(false)
            }
            None => lock(&self.levels).get(&pin).copied().unwrap_or(false),
        }
    }

    fn register_interrupt(
        &self,
        pin: u32,
        edge: Edge,
        handler: InterruptHandler,
    ) -> Result<(), ConfigError> {
        if is_expander_pin(pin) {
            return Err(ConfigError::Gpio {
                pin,
                reason: "expander lines interrupt through their bank".to_string(),
            });
        }
        lock(&self.handlers).insert(pin, (edge, Arc::from(handler)));
        Ok(())
    }
}

impl ExpanderBus for EmulatedGpio {
    fn read_register(&self, register: u8) -> std::io::Result<u8> {
        lock(&self.registers)
            .get(register as usize)
            .copied()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no expander register {:#04x}", register),
                )
            })
    }

    fn write_register(&self, register: u8, value: u8) -> std::io::Result<()> {
        let mut regs = lock(&self.registers);
        let slot = regs.get_mut(register as usize).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no expander register {:#04x}", register),
            )
        })?;
        *slot = value;
        Ok(())
    }
}

impl std::fmt::Debug for EmulatedGpio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedGpio")
            .field("levels", &*lock(&self.levels))
            .field("handlers", &lock(&self.handlers).len())
            .finish_non_exhaustive()
    }
}
