//! Error types for surface setup, transports and the real-time bridge

use thiserror::Error;

/// Setup-time errors, reported synchronously with channel state unchanged
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Slot index outside the preallocated pool
    #[error("{kind} slot {slot} out of range (pool holds {capacity})")]
    SlotOutOfRange {
        kind: &'static str,
        slot: usize,
        capacity: usize,
    },

    /// Both encoder lines on the same pin
    #[error("encoder lines A and B both on pin {0}")]
    IdenticalPins(u32),

    /// Expander pin used but no expander bus was attached
    #[error("pin {0} is on the I2C expander but no expander is attached")]
    NoExpander(u32),

    /// The GPIO layer refused a pin operation
    #[error("GPIO error on pin {pin}: {reason}")]
    Gpio { pin: u32, reason: String },
}

/// Failure to hand a message to a MIDI or OSC transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Outbound ring buffer has no room for another message
    #[error("outbound MIDI ring full")]
    Overflow,

    /// The underlying MIDI port rejected the message
    #[error("MIDI send failed: {0}")]
    Midi(String),

    /// OSC encoding or socket failure
    #[error("OSC send failed: {0}")]
    Osc(String),
}

/// Errors raised by the real-time bridge while processing one block
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// More messages than the block can carry; nothing was written
    #[error("too many MIDI events for block: {events} > {capacity}")]
    TooManyEvents { events: usize, capacity: usize },

    /// The host port refused an event reservation
    #[error("MIDI port refused event at offset {offset}")]
    PortWrite { offset: u32 },
}

/// Errors surfaced by the public [`ControlSurface`](crate::ControlSurface) API
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MIDI backend could not be started (missing feature, server down, no port)
    #[error("MIDI backend error: {0}")]
    Backend(String),
}

/// Result type for surface operations
pub type SurfaceResult<T> = Result<T, SurfaceError>;
