//! 16-line I2C port expander (IOCON.BANK = 0 register layout)

use super::{Bank, ExpanderBus};

/// Register addresses, paired A/B
pub mod reg {
    pub const IODIRA: u8 = 0x00;
    pub const IODIRB: u8 = 0x01;
    pub const IPOLA: u8 = 0x02;
    pub const IPOLB: u8 = 0x03;
    pub const GPINTENA: u8 = 0x04;
    pub const GPINTENB: u8 = 0x05;
    pub const DEFVALA: u8 = 0x06;
    pub const DEFVALB: u8 = 0x07;
    pub const INTCONA: u8 = 0x08;
    pub const INTCONB: u8 = 0x09;
    pub const IOCON: u8 = 0x0A;
    pub const IOCONB: u8 = 0x0B;
    pub const GPPUA: u8 = 0x0C;
    pub const GPPUB: u8 = 0x0D;
    pub const INTFA: u8 = 0x0E;
    pub const INTFB: u8 = 0x0F;
    pub const INTCAPA: u8 = 0x10;
    pub const INTCAPB: u8 = 0x11;
    pub const GPIOA: u8 = 0x12;
    pub const GPIOB: u8 = 0x13;
}

/// IOCON bits
pub const IOCON_MIRROR: u8 = 1 << 6;
pub const IOCON_ODR: u8 = 1 << 2;
pub const IOCON_INTPOL: u8 = 1 << 1;

/// Pull-ups on the two lines of each bank not wired to controls
pub const UNUSED_LINE_PULLUPS: u8 = 0x60;

/// Bring the expander into the input/interrupt configuration
///
/// All lines inputs, pull-ups on the unused lines, no polarity inversion,
/// interrupt-on-change against the previous value, separate active-high
/// push-pull interrupt outputs per bank, interrupts enabled everywhere.
pub fn init_expander(bus: &dyn ExpanderBus) -> std::io::Result<()> {
    for (a, b, value) in [
        (reg::IODIRA, reg::IODIRB, 0xFF),
        (reg::GPPUA, reg::GPPUB, UNUSED_LINE_PULLUPS),
        (reg::IPOLA, reg::IPOLB, 0x00),
        (reg::INTCONA, reg::INTCONB, 0x00),
    ] {
        bus.write_register(a, value)?;
        bus.write_register(b, value)?;
    }

    for iocon in [reg::IOCON, reg::IOCONB] {
        let value = bus.read_register(iocon)?;
        bus.write_register(iocon, iocon_value(value))?;
    }

    bus.write_register(reg::GPINTENA, 0xFF)?;
    bus.write_register(reg::GPINTENB, 0xFF)?;

    log::info!(
        "Expander: initialized (interrupts on pins {} / {})",
        Bank::A.interrupt_pin(),
        Bank::B.interrupt_pin()
    );
    Ok(())
}

/// Unmirrored, driven, active-high interrupt outputs; other bits preserved
#[inline]
pub fn iocon_value(current: u8) -> u8 {
    (current & !(IOCON_MIRROR | IOCON_ODR)) | IOCON_INTPOL
}

/// Snapshot of a bank's line levels
pub fn read_bank(bus: &dyn ExpanderBus, bank: Bank) -> std::io::Result<u8> {
    bus.read_register(bank.gpio_register())
}
