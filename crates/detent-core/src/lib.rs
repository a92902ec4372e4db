//! Rotary encoder and switch input core
//!
//! This crate provides:
//! - Quadrature decoding with spin acceleration for rotary encoders
//! - Debounced switches with release-to-press interval tracking
//! - Publication of encoder values as MIDI Control-Change or OSC
//! - A real-time bridge exchanging MIDI with an audio callback (JACK)
//! - A lock-free queue carrying inbound Program-Change events to the app
//!
//! # Architecture
//!
//! ```text
//! GPIO interrupt / poll thread ──► InputRouter ──► ChannelPool ──► EventSink ──► MIDI / OSC
//!                                                      ▲
//! audio callback ──► RealtimeBridge ── CC snaps ───────┘
//!                          └── Program-Change ──► EventQueue ──► ControlSurface::pop_event()
//! ```
//!
//! All channel state lives in a preallocated [`ChannelPool`] made of
//! per-field atomics, so interrupt handlers, the poll thread and the audio
//! callback share it without locks.

pub mod backend;
mod bridge;
mod clock;
pub mod config;
pub mod debug;
mod encoder;
mod error;
pub mod gpio;
mod osc;
mod poll;
mod pool;
mod queue;
mod ring;
mod router;
pub mod sink;
mod surface;
mod switch;

pub use backend::{list_midi_ports, start_midi_backend, BackendHandle, LogTransport, MidiBackend};
pub use bridge::{BlockStats, BridgeCounters, MidiBlockWriter, RealtimeBridge};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    default_config_path, load_config, save_config, EncoderSlotConfig, MidiBackendKind,
    SurfaceConfig, SwitchSlotConfig,
};
pub use encoder::{
    EncoderChannel, EncoderSetup, Rotation, TickOutcome, DEBOUNCE_US, TICKS_PER_DETENT,
};
pub use error::{BridgeError, ConfigError, SurfaceError, SurfaceResult, TransportError};
pub use gpio::{Bank, EmulatedGpio, ExpanderBus, GpioHal};
pub use osc::UdpOscTransport;
pub use poll::{SwitchPoller, DEFAULT_POLL_INTERVAL};
pub use pool::{ChannelPool, MAX_ENCODERS, MAX_SWITCHES};
pub use queue::{
    event_queue, EventConsumer, EventProducer, InboundEvent, PushError, EVENT_QUEUE_CAPACITY,
    NO_EVENT,
};
pub use ring::{ring_port, BridgeRings, InboundTap, RingPortTransport, RING_CAPACITY};
pub use router::InputRouter;
pub use sink::{EventSink, MidiTransport, OscArg, OscTransport};
pub use surface::{ControlSurface, SurfaceBuilder};
pub use switch::{SwitchChannel, SwitchOutcome, SwitchSetup};
