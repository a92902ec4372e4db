//! Hardware seams: GPIO lines and the 16-line I2C expander
//!
//! Pins below [`EXPANDER_BASE_PIN`] are native lines that can raise
//! interrupts. Pins `100..116` live on the expander, split into two 8-line
//! banks; each bank signals changes on its own native interrupt line and is
//! then read as a whole register.
//!
//! Real-board drivers implement [`GpioHal`] and [`ExpanderBus`] outside this
//! crate. [`EmulatedGpio`] implements both in memory.

mod emulated;
pub mod expander;

pub use emulated::EmulatedGpio;

use std::ops::RangeInclusive;

use crate::error::ConfigError;

/// First pin number mapped onto the expander
pub const EXPANDER_BASE_PIN: u32 = 100;

/// Lines per expander bank
pub const BANK_WIDTH: u32 = 8;

/// Native line carrying the bank A interrupt
pub const BANK_A_INT_PIN: u32 = 27;

/// Native line carrying the bank B interrupt
pub const BANK_B_INT_PIN: u32 = 25;

/// Whether `pin` is an expander line
#[inline]
pub fn is_expander_pin(pin: u32) -> bool {
    pin >= EXPANDER_BASE_PIN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input(Pull),
    Output,
}

/// Interrupt trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    /// Whether a transition to `level` fires this trigger
    pub fn fires_on(self, level: bool) -> bool {
        match self {
            Edge::Rising => level,
            Edge::Falling => !level,
            Edge::Both => true,
        }
    }
}

/// Interrupt callback; runs in interrupt context, must not block
pub type InterruptHandler = Box<dyn Fn() + Send + Sync + 'static>;

/// Native GPIO access
pub trait GpioHal: Send + Sync {
    fn configure_pin(&self, pin: u32, mode: PinMode) -> Result<(), ConfigError>;

    /// Current logic level of `pin`
    fn read_pin(&self, pin: u32) -> bool;

    /// Install `handler` for `pin`, replacing any previous one
    fn register_interrupt(
        &self,
        pin: u32,
        edge: Edge,
        handler: InterruptHandler,
    ) -> Result<(), ConfigError>;
}

/// Register access to the I2C expander
pub trait ExpanderBus: Send + Sync {
    fn read_register(&self, reg: u8) -> std::io::Result<u8>;

    fn write_register(&self, reg: u8, value: u8) -> std::io::Result<()>;
}

/// One half of the expander
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    A,
    B,
}

impl Bank {
    pub const ALL: [Bank; 2] = [Bank::A, Bank::B];

    pub fn index(self) -> u8 {
        match self {
            Bank::A => 0,
            Bank::B => 1,
        }
    }

    /// Bank holding `pin`, if it is an expander line
    pub fn of_pin(pin: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|bank| bank.pins().contains(&pin))
    }

    /// First pin of the bank
    pub fn base_pin(self) -> u32 {
        EXPANDER_BASE_PIN + BANK_WIDTH * self.index() as u32
    }

    pub fn pins(self) -> RangeInclusive<u32> {
        let base = self.base_pin();
        base..=base + BANK_WIDTH - 1
    }

    /// Level of `pin` within a bank register snapshot; `None` outside the bank
    pub fn level(self, register: u8, pin: u32) -> Option<bool> {
        self.pins()
            .contains(&pin)
            .then(|| register >> (pin - self.base_pin()) & 1 == 1)
    }

    /// Native line the bank raises on change
    pub fn interrupt_pin(self) -> u32 {
        match self {
            Bank::A => BANK_A_INT_PIN,
            Bank::B => BANK_B_INT_PIN,
        }
    }

    /// Port register holding the bank's line levels
    pub fn gpio_register(self) -> u8 {
        match self {
            Bank::A => expander::reg::GPIOA,
            Bank::B => expander::reg::GPIOB,
        }
    }
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bank::A => write!(f, "A"),
            Bank::B => write!(f, "B"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_ranges() {
        assert_eq!(Bank::A.pins(), 100..=107);
        assert_eq!(Bank::B.pins(), 108..=115);
        assert_eq!(Bank::of_pin(108), Some(Bank::B));
        assert_eq!(Bank::of_pin(116), None);
        assert_eq!(Bank::of_pin(27), None);
    }

    #[test]
    fn test_bank_level_reads_bit() {
        assert_eq!(Bank::A.level(0b0000_0100, 102), Some(true));
        assert_eq!(Bank::A.level(0b0000_0100, 101), Some(false));
        assert_eq!(Bank::B.level(0b1000_0000, 115), Some(true));
        assert_eq!(Bank::B.level(0xFF, 100), None);
    }

    #[test]
    fn test_edge_triggers() {
        assert!(Edge::Rising.fires_on(true));
        assert!(!Edge::Rising.fires_on(false));
        assert!(Edge::Falling.fires_on(false));
        assert!(Edge::Both.fires_on(false) && Edge::Both.fires_on(true));
    }
}
