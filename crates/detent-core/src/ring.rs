//! Byte rings between non-real-time publishers and the audio callback
//!
//! Two rtrb SPSC rings, each holding up to 256 three-byte MIDI records:
//!
//! - **outbound**: [`RingPortTransport`] (any thread, serialized by a mutex)
//!   → [`RealtimeBridge`](crate::RealtimeBridge) (audio callback)
//! - **inbound**: [`RealtimeBridge`](crate::RealtimeBridge) → [`InboundTap`]
//!   (pass-through copy of received CC/PC messages)
//!
//! Records are always 3 bytes wide; 2-byte messages are padded with 0 so
//! the real-time side can split the ring contents without parsing.

use std::sync::Mutex;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::TransportError;
use crate::sink::MidiTransport;

/// Bytes per ring record
pub const RECORD_LEN: usize = 3;

/// Ring size in bytes (256 records)
pub const RING_CAPACITY: usize = RECORD_LEN * 256;

/// On-wire length of a MIDI channel message given its status byte
///
/// Program Change (0xC_) and Channel Pressure (0xD_) carry one data byte.
#[inline]
pub fn message_len(status: u8) -> usize {
    match status >> 4 {
        0xC | 0xD => 2,
        _ => 3,
    }
}

/// Ring ends owned by the real-time bridge
pub struct BridgeRings {
    /// Records waiting to be written to the MIDI port
    pub outbound: Consumer<u8>,
    /// Pass-through copy of received messages
    pub inbound: Producer<u8>,
}

/// Create the outbound/inbound ring pair
///
/// Returns the publishing transport, the ends for the bridge and the
/// reader for the inbound pass-through.
pub fn ring_port() -> (RingPortTransport, BridgeRings, InboundTap) {
    let (out_tx, out_rx) = RingBuffer::<u8>::new(RING_CAPACITY);
    let (in_tx, in_rx) = RingBuffer::<u8>::new(RING_CAPACITY);
    (
        RingPortTransport {
            producer: Mutex::new(out_tx),
        },
        BridgeRings {
            outbound: out_rx,
            inbound: in_tx,
        },
        InboundTap { consumer: in_rx },
    )
}

/// [`MidiTransport`] that queues records for the audio callback
pub struct RingPortTransport {
    producer: Mutex<Producer<u8>>,
}

impl RingPortTransport {
    /// Append one record; refuses rather than splitting it
    pub fn send_record(&self, record: [u8; RECORD_LEN]) -> Result<(), TransportError> {
        let mut producer = self
            .producer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if producer.slots() < RECORD_LEN {
            log::warn!(
                "RingPort: outbound ring full, dropping {:02X} {:02X} {:02X}",
                record[0],
                record[1],
                record[2]
            );
            return Err(TransportError::Overflow);
        }
        for byte in record {
            producer
                .push(byte)
                .map_err(|_| TransportError::Overflow)?;
        }
        Ok(())
    }

    /// Free record slots in the outbound ring
    pub fn free_records(&self) -> usize {
        let producer = self
            .producer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        producer.slots() / RECORD_LEN
    }
}

impl MidiTransport for RingPortTransport {
    fn send_control_change(&self, chan: u8, ctrl: u8, value: u8) -> Result<(), TransportError> {
        self.send_record([0xB0 | (chan & 0x0F), ctrl & 0x7F, value & 0x7F])
    }

    fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError> {
        self.send_record([0xC0 | (chan & 0x0F), program & 0x7F, 0])
    }
}

/// Copy a received message into the pass-through ring if a whole record fits
///
/// Real-time safe: no allocation, no locking. Returns whether it was copied.
#[inline]
pub(crate) fn push_inbound_record(ring: &mut Producer<u8>, bytes: &[u8]) -> bool {
    if ring.slots() < RECORD_LEN {
        return false;
    }
    for i in 0..RECORD_LEN {
        let byte = bytes.get(i).copied().unwrap_or(0);
        if ring.push(byte).is_err() {
            return false;
        }
    }
    true
}

/// Reader for the inbound pass-through ring
pub struct InboundTap {
    consumer: Consumer<u8>,
}

impl InboundTap {
    /// Next complete record, if any
    pub fn read_record(&mut self) -> Option<[u8; RECORD_LEN]> {
        if self.consumer.slots() < RECORD_LEN {
            return None;
        }
        let mut record = [0u8; RECORD_LEN];
        for byte in record.iter_mut() {
            *byte = self.consumer.pop().ok()?;
        }
        Some(record)
    }

    /// Number of complete records waiting
    pub fn pending(&self) -> usize {
        self.consumer.slots() / RECORD_LEN
    }
}
