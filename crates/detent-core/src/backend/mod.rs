//! MIDI backend selection
//!
//! - **ring** (`jack-backend` feature): publishers write into the outbound
//!   ring, a JACK process callback runs the [`RealtimeBridge`] each block.
//! - **sequencer** (`seq-backend` feature): publishers write straight to a
//!   platform MIDI output through midir; an optional input port feeds the
//!   event queue.
//!
//! When the configured backend is not compiled in, [`start_midi_backend`]
//! fails and callers may fall back to [`LogTransport`].

#[cfg(feature = "jack-backend")]
pub mod jack;
#[cfg(feature = "seq-backend")]
pub mod seq;

use std::sync::Arc;

use crate::bridge::BridgeCounters;
use crate::config::{MidiBackendKind, SurfaceConfig};
#[cfg(not(all(feature = "jack-backend", feature = "seq-backend")))]
use crate::error::SurfaceError;
use crate::error::{SurfaceResult, TransportError};
use crate::pool::ChannelPool;
use crate::queue::EventConsumer;
use crate::ring::InboundTap;
use crate::sink::MidiTransport;

/// A running MIDI backend
pub struct MidiBackend {
    /// Where encoder values are published
    pub transport: Arc<dyn MidiTransport>,
    /// Inbound Program-Change events
    pub events: EventConsumer,
    /// Bridge drop counters (ring backend only)
    pub counters: Option<Arc<BridgeCounters>>,
    /// Pass-through copy of inbound CC/PC (ring backend only)
    pub inbound: Option<InboundTap>,
    /// Keeps the client/connection alive; drop to disconnect
    pub handle: BackendHandle,
}

pub enum BackendHandle {
    #[cfg(feature = "jack-backend")]
    Jack(jack::JackMidiHandle),
    #[cfg(feature = "seq-backend")]
    Sequencer(seq::SeqInputHandle),
    /// Nothing to keep alive
    Detached,
}

impl BackendHandle {
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "jack-backend")]
            BackendHandle::Jack(_) => "jack",
            #[cfg(feature = "seq-backend")]
            BackendHandle::Sequencer(_) => "sequencer",
            BackendHandle::Detached => "detached",
        }
    }
}

/// Start the backend named in `config`
pub fn start_midi_backend(
    config: &SurfaceConfig,
    pool: Arc<ChannelPool>,
) -> SurfaceResult<MidiBackend> {
    match config.backend {
        MidiBackendKind::Ring => start_ring(config, pool),
        MidiBackendKind::Sequencer => start_sequencer(config, pool),
    }
}

#[cfg(feature = "jack-backend")]
fn start_ring(config: &SurfaceConfig, pool: Arc<ChannelPool>) -> SurfaceResult<MidiBackend> {
    jack::start(config, pool)
}

#[cfg(not(feature = "jack-backend"))]
fn start_ring(_config: &SurfaceConfig, _pool: Arc<ChannelPool>) -> SurfaceResult<MidiBackend> {
    Err(SurfaceError::Backend(
        "ring backend needs the jack-backend feature".to_string(),
    ))
}

#[cfg(feature = "seq-backend")]
fn start_sequencer(config: &SurfaceConfig, pool: Arc<ChannelPool>) -> SurfaceResult<MidiBackend> {
    seq::start(config, pool)
}

#[cfg(not(feature = "seq-backend"))]
fn start_sequencer(
    _config: &SurfaceConfig,
    _pool: Arc<ChannelPool>,
) -> SurfaceResult<MidiBackend> {
    Err(SurfaceError::Backend(
        "sequencer backend needs the seq-backend feature".to_string(),
    ))
}

/// Names of the MIDI ports visible to the compiled-in backends
pub fn list_midi_ports() -> Vec<String> {
    #[allow(unused_mut)]
    let mut ports = Vec::new();
    #[cfg(feature = "jack-backend")]
    ports.extend(jack::list_midi_ports());
    #[cfg(feature = "seq-backend")]
    ports.extend(seq::list_output_ports());
    ports
}

/// Transport that only logs, for hosts without a MIDI backend
#[derive(Debug, Default)]
pub struct LogTransport;

impl MidiTransport for LogTransport {
    fn send_control_change(&self, chan: u8, ctrl: u8, value: u8) -> Result<(), TransportError> {
        log::info!("[MIDI OUT] CC ch={} cc={} val={}", chan, ctrl, value);
        Ok(())
    }

    fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError> {
        log::info!("[MIDI OUT] PC ch={} prog={}", chan, program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_transport_accepts_everything() {
        let t = LogTransport;
        assert!(t.send_control_change(0, 1, 2).is_ok());
        assert!(t.send_program_change(15, 127).is_ok());
    }

    #[cfg(not(feature = "jack-backend"))]
    #[test]
    fn test_ring_backend_requires_feature() {
        let config = SurfaceConfig::default();
        let err = start_midi_backend(&config, Arc::new(ChannelPool::new())).err();
        assert!(matches!(err, Some(SurfaceError::Backend(_))));
    }

    #[cfg(not(any(feature = "jack-backend", feature = "seq-backend")))]
    #[test]
    fn test_no_ports_without_backends() {
        assert!(list_midi_ports().is_empty());
    }
}
