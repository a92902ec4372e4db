//! Per-block MIDI exchange between the audio callback and the rest of the system
//!
//! ```text
//! ┌──────────────────┐  3-byte records   ┌──────────────────────┐  write(offset, msg)
//! │ RingPortTransport│──────────────────►│                      │────────────────────► MIDI out
//! │ (publishers)     │  outbound ring    │   RealtimeBridge     │
//! └──────────────────┘                   │  (audio callback)    │◄──────────────────── MIDI in
//!          ▲                             │                      │
//!          │ CC snaps value              └──┬────────────┬──────┘
//! ┌────────┴─────────┐                      │ PC         │ CC/PC copy
//! │   ChannelPool    │◄─────────────────────┘            ▼
//! └──────────────────┘            EventQueue      inbound ring (InboundTap)
//! ```
//!
//! [`RealtimeBridge::process_block`] runs once per audio block. It never
//! allocates, locks or logs; problems surface through the returned
//! [`BlockStats`]/[`BridgeError`] and the shared [`BridgeCounters`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::BridgeError;
use crate::pool::ChannelPool;
use crate::queue::{EventProducer, InboundEvent};
use crate::ring::{message_len, push_inbound_record, BridgeRings, RECORD_LEN, RING_CAPACITY};

/// Destination for the messages of one audio block
///
/// `capacity` is the number of events the block can carry (the JACK backend
/// uses the block length in frames).
pub trait MidiBlockWriter {
    fn capacity(&self) -> usize;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), BridgeError>;
}

/// What one call to [`RealtimeBridge::process_block`] did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// Messages written to the output port
    pub written: usize,
    /// Control-Change messages that updated at least one encoder
    pub cc_applied: usize,
    /// Program-Change messages pushed into the event queue
    pub programs_queued: usize,
    /// Messages dropped in this block (either direction)
    pub dropped: usize,
}

/// Cumulative drop counters, readable from any thread
#[derive(Debug, Default)]
pub struct BridgeCounters {
    outbound_dropped: AtomicU64,
    inbound_dropped: AtomicU64,
    queue_full: AtomicU64,
    passthrough_dropped: AtomicU64,
}

impl BridgeCounters {
    /// Outbound messages discarded because the block could not carry them
    pub fn outbound_dropped(&self) -> u64 {
        self.outbound_dropped.load(Ordering::Relaxed)
    }

    /// Inbound messages beyond the block capacity
    pub fn inbound_dropped(&self) -> u64 {
        self.inbound_dropped.load(Ordering::Relaxed)
    }

    /// Program changes lost because the event queue was full
    pub fn queue_full(&self) -> u64 {
        self.queue_full.load(Ordering::Relaxed)
    }

    /// Messages not copied because the inbound pass-through ring was full
    pub fn passthrough_dropped(&self) -> u64 {
        self.passthrough_dropped.load(Ordering::Relaxed)
    }

    fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
}

/// Real-time side of the MIDI plumbing, owned by the audio callback
pub struct RealtimeBridge {
    rings: BridgeRings,
    events: EventProducer,
    pool: Arc<ChannelPool>,
    counters: Arc<BridgeCounters>,
    scratch: [u8; RING_CAPACITY],
}

impl RealtimeBridge {
    pub fn new(rings: BridgeRings, events: EventProducer, pool: Arc<ChannelPool>) -> Self {
        Self {
            rings,
            events,
            pool,
            counters: Arc::new(BridgeCounters::default()),
            scratch: [0; RING_CAPACITY],
        }
    }

    /// Shared handle to the drop counters
    pub fn counters(&self) -> Arc<BridgeCounters> {
        self.counters.clone()
    }

    /// Exchange one block of MIDI
    ///
    /// Output is handled first: every queued record is written at offsets
    /// 0, 1, 2, ... or, if the records outnumber `out.capacity()`, all of
    /// them are discarded. Input is processed even when output failed; the
    /// first error is returned after both directions ran.
    pub fn process_block<'a, I, W>(
        &mut self,
        inbound: I,
        out: &mut W,
    ) -> Result<BlockStats, BridgeError>
    where
        I: IntoIterator<Item = &'a [u8]>,
        W: MidiBlockWriter + ?Sized,
    {
        let mut stats = BlockStats::default();
        let output = self.write_outbound(out, &mut stats);
        let input = self.read_inbound(inbound, out.capacity(), &mut stats);
        output.and(input).map(|()| stats)
    }

    fn write_outbound<W>(&mut self, out: &mut W, stats: &mut BlockStats) -> Result<(), BridgeError>
    where
        W: MidiBlockWriter + ?Sized,
    {
        let len = self.drain_outbound();
        let records = len / RECORD_LEN;
        if records == 0 {
            return Ok(());
        }

        let capacity = out.capacity();
        if records > capacity {
            stats.dropped += records;
            BridgeCounters::add(&self.counters.outbound_dropped, records);
            return Err(BridgeError::TooManyEvents {
                events: records,
                capacity,
            });
        }

        for (i, record) in self.scratch[..len].chunks_exact(RECORD_LEN).enumerate() {
            let size = message_len(record[0]);
            if let Err(e) = out.write(i as u32, &record[..size]) {
                let lost = records - i;
                stats.dropped += lost;
                BridgeCounters::add(&self.counters.outbound_dropped, lost);
                return Err(e);
            }
            stats.written += 1;
        }
        Ok(())
    }

    /// Move every complete record from the outbound ring into scratch
    fn drain_outbound(&mut self) -> usize {
        let available = self.rings.outbound.slots().min(RING_CAPACITY);
        let available = available - available % RECORD_LEN;
        if available == 0 {
            return 0;
        }
        let Ok(chunk) = self.rings.outbound.read_chunk(available) else {
            return 0;
        };
        let (first, second) = chunk.as_slices();
        self.scratch[..first.len()].copy_from_slice(first);
        self.scratch[first.len()..available].copy_from_slice(second);
        chunk.commit_all();
        available
    }

    fn read_inbound<'a, I>(
        &mut self,
        inbound: I,
        capacity: usize,
        stats: &mut BlockStats,
    ) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut seen = 0usize;
        for bytes in inbound {
            seen += 1;
            if seen > capacity {
                continue;
            }
            let Some(event) = InboundEvent::from_bytes(bytes) else {
                continue;
            };

            match event.kind() {
                0xB => {
                    if self
                        .pool
                        .sync_from_control_change(event.channel(), event.data1, event.data2)
                        > 0
                    {
                        stats.cc_applied += 1;
                    }
                }
                0xC => {
                    if self.events.push(event.pack()).is_ok() {
                        stats.programs_queued += 1;
                    } else {
                        stats.dropped += 1;
                        BridgeCounters::add(&self.counters.queue_full, 1);
                    }
                }
                _ => continue,
            }

            if !push_inbound_record(&mut self.rings.inbound, bytes) {
                BridgeCounters::add(&self.counters.passthrough_dropped, 1);
            }
        }

        if seen > capacity {
            let extra = seen - capacity;
            stats.dropped += extra;
            BridgeCounters::add(&self.counters.inbound_dropped, extra);
            return Err(BridgeError::TooManyEvents {
                events: seen,
                capacity,
            });
        }
        Ok(())
    }
}
