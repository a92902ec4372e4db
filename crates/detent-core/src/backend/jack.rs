//! JACK MIDI client driving the [`RealtimeBridge`]
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │ EventSink        │───3-byte records───►│   Outbound ring     │
//! │ (any thread)     │                     │  (rtrb, 768 bytes)  │
//! └──────────────────┘                     └──────────┬──────────┘
//!                                                     │ drain
//!                                                     ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  EventConsumer   │◄──── PC events ─────│  JACK RT thread     │
//! │  (application)   │                     │  (owns the bridge)  │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The process callback keeps running after a bridge error; losses show up
//! in [`BridgeCounters`](crate::BridgeCounters).

use std::sync::Arc;

use jack::{Client, ClientOptions, Control, MidiIn, MidiOut, MidiWriter, Port, ProcessScope, RawMidi};

use super::{BackendHandle, MidiBackend};
use crate::bridge::{MidiBlockWriter, RealtimeBridge};
use crate::config::SurfaceConfig;
use crate::error::{BridgeError, SurfaceError, SurfaceResult};
use crate::pool::ChannelPool;
use crate::queue::event_queue;
use crate::ring::ring_port;

/// JACK port names
const OUTPUT_PORT: &str = "output";
const INPUT_PORT: &str = "input";

/// Keeps the JACK client active. Drop to disconnect.
pub struct JackMidiHandle {
    _async_client: jack::AsyncClient<JackNotifications, JackProcessor>,
    client_name: String,
    buffer_size: u32,
}

impl JackMidiHandle {
    /// Name JACK assigned (may differ from the requested one)
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

/// Output port writer for one process cycle
struct PortWriter<'a> {
    writer: MidiWriter<'a>,
    capacity: usize,
}

impl MidiBlockWriter for PortWriter<'_> {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), BridgeError> {
        self.writer
            .write(&RawMidi {
                time: offset,
                bytes,
            })
            .map_err(|_| BridgeError::PortWrite { offset })
    }
}

/// JACK process handler; owns the bridge exclusively
pub struct JackProcessor {
    input: Port<MidiIn>,
    output: Port<MidiOut>,
    bridge: RealtimeBridge,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let mut out = PortWriter {
            writer: self.output.writer(ps),
            capacity: ps.n_frames() as usize,
        };
        let inbound = self.input.iter(ps).map(|event| event.bytes);
        // Errors are already counted by the bridge
        let _ = self.bridge.process_block(inbound, &mut out);
        Control::Continue
    }
}

/// JACK notification handler
pub struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

/// Register the MIDI ports and activate the client
pub fn start(config: &SurfaceConfig, pool: Arc<ChannelPool>) -> SurfaceResult<MidiBackend> {
    let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
        .map_err(|e| SurfaceError::Backend(format!("Failed to create JACK client: {}", e)))?;
    let client_name = client.name().to_string();
    let buffer_size = client.buffer_size();

    let output = client
        .register_port(OUTPUT_PORT, MidiOut::default())
        .map_err(|e| SurfaceError::Backend(format!("Failed to register port: {}", e)))?;
    let input = client
        .register_port(INPUT_PORT, MidiIn::default())
        .map_err(|e| SurfaceError::Backend(format!("Failed to register port: {}", e)))?;

    let (transport, rings, tap) = ring_port();
    let (producer, events) = event_queue(config.queue_capacity);
    let bridge = RealtimeBridge::new(rings, producer, pool);
    let counters = bridge.counters();

    let async_client = client
        .activate_async(
            JackNotifications,
            JackProcessor {
                input,
                output,
                bridge,
            },
        )
        .map_err(|e| SurfaceError::Backend(format!("Failed to activate JACK client: {}", e)))?;

    log::info!(
        "JACK MIDI client '{}' active (buffer: {} frames)",
        client_name,
        buffer_size
    );

    Ok(MidiBackend {
        transport: Arc::new(transport),
        events,
        counters: Some(counters),
        inbound: Some(tap),
        handle: BackendHandle::Jack(JackMidiHandle {
            _async_client: async_client,
            client_name,
            buffer_size,
        }),
    })
}

/// MIDI ports on the running JACK server
pub fn list_midi_ports() -> Vec<String> {
    let (client, _) = match Client::new("detent_port_query", ClientOptions::NO_START_SERVER) {
        Ok(c) => c,
        Err(e) => {
            log::debug!("Could not connect to JACK to enumerate ports: {}", e);
            return vec![];
        }
    };
    client.ports(None, Some("midi"), jack::PortFlags::empty())
}
