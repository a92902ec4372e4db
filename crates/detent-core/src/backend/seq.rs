//! Direct sequencer backend over midir (ALSA on Linux, CoreMIDI, WinMM)
//!
//! Output goes straight to a platform MIDI port, no audio callback involved.
//! With `input_port` configured, incoming messages are handled the same way
//! the real-time bridge handles them: Control-Change snaps encoders,
//! Program-Change lands in the event queue.

use std::sync::{Arc, Mutex};

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use super::{BackendHandle, MidiBackend};
use crate::config::SurfaceConfig;
use crate::error::{SurfaceError, SurfaceResult, TransportError};
use crate::pool::ChannelPool;
use crate::queue::{event_queue, EventProducer, InboundEvent};
use crate::sink::MidiTransport;

/// [`MidiTransport`] writing to a midir output connection
pub struct SeqTransport {
    connection: Mutex<MidiOutputConnection>,
}

impl SeqTransport {
    /// Connect to the first output port whose name contains `port_match`
    /// (case-insensitive)
    pub fn connect(client_name: &str, port_match: &str) -> SurfaceResult<Self> {
        let pattern = port_match.to_lowercase();
        let midi_out = MidiOutput::new(client_name)
            .map_err(|e| SurfaceError::Backend(format!("Failed to initialize MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|port| {
                midi_out
                    .port_name(port)
                    .map(|name| name.to_lowercase().contains(&pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                SurfaceError::Backend(format!("No MIDI output port matching: {}", port_match))
            })?;
        let port_name = midi_out
            .port_name(port)
            .map_err(|e| SurfaceError::Backend(e.to_string()))?;
        log::info!("MIDI: Found output port: {}", port_name);

        let connection = midi_out
            .connect(port, "detent-output")
            .map_err(|e| SurfaceError::Backend(format!("Failed to connect output: {}", e)))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| TransportError::Midi("output connection poisoned".to_string()))?;
        connection
            .send(bytes)
            .map_err(|e| TransportError::Midi(e.to_string()))
    }
}

impl MidiTransport for SeqTransport {
    fn send_control_change(&self, chan: u8, ctrl: u8, value: u8) -> Result<(), TransportError> {
        log::debug!("[MIDI OUT] CC ch={} cc={:#04x} val={}", chan, ctrl, value);
        self.send(&[0xB0 | (chan & 0x0F), ctrl & 0x7F, value & 0x7F])
    }

    fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError> {
        log::debug!("[MIDI OUT] PC ch={} prog={}", chan, program);
        self.send(&[0xC0 | (chan & 0x0F), program & 0x7F])
    }
}

/// Data owned by the input callback
struct CallbackData {
    pool: Arc<ChannelPool>,
    events: EventProducer,
}

/// Keeps the optional input connection open
pub struct SeqInputHandle {
    _connection: Option<MidiInputConnection<CallbackData>>,
}

/// Called from the MIDI driver thread for every incoming message
fn midi_callback(_timestamp: u64, bytes: &[u8], data: &mut CallbackData) {
    let Some(event) = InboundEvent::from_bytes(bytes) else {
        return;
    };
    match event.kind() {
        0xB => {
            data.pool
                .sync_from_control_change(event.channel(), event.data1, event.data2);
        }
        0xC => {
            if data.events.push(event.pack()).is_err() {
                log::warn!("MIDI: event queue full, dropping program change");
            }
        }
        _ => {}
    }
}

fn connect_input(
    client_name: &str,
    port_match: &str,
    data: CallbackData,
) -> SurfaceResult<MidiInputConnection<CallbackData>> {
    let pattern = port_match.to_lowercase();
    let midi_in = MidiInput::new(client_name)
        .map_err(|e| SurfaceError::Backend(format!("Failed to initialize MIDI input: {}", e)))?;
    let ports = midi_in.ports();
    let port = ports
        .iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .map(|name| name.to_lowercase().contains(&pattern))
                .unwrap_or(false)
        })
        .ok_or_else(|| SurfaceError::Backend(format!("No MIDI input port matching: {}", port_match)))?;
    log::info!(
        "MIDI: Found input port: {}",
        midi_in.port_name(port).unwrap_or_default()
    );

    midi_in
        .connect(port, "detent-input", midi_callback, data)
        .map_err(|e| SurfaceError::Backend(format!("Failed to connect input: {}", e)))
}

/// Open the configured output (and input, if any)
pub fn start(config: &SurfaceConfig, pool: Arc<ChannelPool>) -> SurfaceResult<MidiBackend> {
    let output = config
        .output_port
        .as_deref()
        .ok_or_else(|| SurfaceError::Backend("sequencer backend needs output_port".to_string()))?;
    let transport = SeqTransport::connect(&config.client_name, output)?;

    let (producer, events) = event_queue(config.queue_capacity);
    let input = match config.input_port.as_deref() {
        Some(port) => Some(connect_input(
            &config.client_name,
            port,
            CallbackData {
                pool,
                events: producer,
            },
        )?),
        None => None,
    };

    Ok(MidiBackend {
        transport: Arc::new(transport),
        events,
        counters: None,
        inbound: None,
        handle: BackendHandle::Sequencer(SeqInputHandle { _connection: input }),
    })
}

/// Output ports visible to midir
pub fn list_output_ports() -> Vec<String> {
    match MidiOutput::new("detent-list") {
        Ok(midi_out) => midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect(),
        Err(e) => {
            log::debug!("MIDI: Could not enumerate output ports: {}", e);
            Vec::new()
        }
    }
}
