//! Bounded SPSC queue carrying inbound MIDI events to the application
//!
//! The audio callback owns the [`EventProducer`], the application owns the
//! [`EventConsumer`]. Neither side ever waits:
//!
//! ```text
//! ┌───────────────────┐   push() (drop when full)   ┌───────────────────┐
//! │ RealtimeBridge    │────────────────────────────►│ slots: [AtomicU32]│
//! │ (audio callback)  │                             │ one slot kept free│
//! └───────────────────┘                             └─────────┬─────────┘
//!                                                             │ pop() (0 = none)
//!                                                             ▼
//!                                                   ┌───────────────────┐
//!                                                   │ application       │
//!                                                   └───────────────────┘
//! ```
//!
//! Events are packed as `status | data1 << 8 | data2 << 16`. A status byte
//! always has its high bit set, so 0 never encodes a real event and serves
//! as the "empty" sentinel.
//!
//! Cursor updates are published with `Release` and observed with `Acquire`,
//! so a popped slot always holds the value written before its cursor moved.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Default queue size (one slot stays unused)
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Sentinel returned by [`EventConsumer::pop`] when nothing is queued
pub const NO_EVENT: u32 = 0;

/// Why a push was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Queue full; the event is handed back
    Full(u32),
    /// 0 is reserved for the empty sentinel
    Reserved,
}

/// A 3-byte inbound MIDI message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InboundEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl InboundEvent {
    /// Take up to three bytes of a raw message; missing data bytes read as 0
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        Some(Self {
            status,
            data1: bytes.get(1).copied().unwrap_or(0),
            data2: bytes.get(2).copied().unwrap_or(0),
        })
    }

    #[inline]
    pub fn pack(self) -> u32 {
        self.status as u32 | (self.data1 as u32) << 8 | (self.data2 as u32) << 16
    }

    /// Inverse of [`pack`](Self::pack); the sentinel yields `None`
    #[inline]
    pub fn unpack(packed: u32) -> Option<Self> {
        if packed == NO_EVENT {
            return None;
        }
        Some(Self {
            status: (packed & 0xFF) as u8,
            data1: ((packed >> 8) & 0xFF) as u8,
            data2: ((packed >> 16) & 0xFF) as u8,
        })
    }

    /// Message type nibble (0xB = Control Change, 0xC = Program Change, ...)
    #[inline]
    pub fn kind(&self) -> u8 {
        self.status >> 4
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    pub fn is_program_change(&self) -> bool {
        self.kind() == 0xC
    }
}

struct Shared {
    slots: Box<[AtomicU32]>,
    read: AtomicUsize,
    write: AtomicUsize,
}

impl Shared {
    #[inline]
    fn next(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.slots.len() {
            0
        } else {
            next
        }
    }
}

/// Create a queue holding up to `capacity - 1` events
///
/// Capacities below 2 are raised to 2 (a single usable slot).
pub fn event_queue(capacity: usize) -> (EventProducer, EventConsumer) {
    let capacity = capacity.max(2);
    let shared = Arc::new(Shared {
        slots: (0..capacity).map(|_| AtomicU32::new(NO_EVENT)).collect(),
        read: AtomicUsize::new(0),
        write: AtomicUsize::new(0),
    });
    (
        EventProducer {
            shared: shared.clone(),
        },
        EventConsumer { shared },
    )
}

/// Write side, owned by the real-time domain
pub struct EventProducer {
    shared: Arc<Shared>,
}

impl EventProducer {
    /// Append a packed event; never overwrites unread entries
    #[inline]
    pub fn push(&mut self, event: u32) -> Result<(), PushError> {
        if event == NO_EVENT {
            return Err(PushError::Reserved);
        }
        let write = self.shared.write.load(Ordering::Relaxed);
        let next = self.shared.next(write);
        if next == self.shared.read.load(Ordering::Acquire) {
            return Err(PushError::Full(event));
        }
        self.shared.slots[write].store(event, Ordering::Relaxed);
        self.shared.write.store(next, Ordering::Release);
        Ok(())
    }

    /// Number of events that can still be pushed
    pub fn slots(&self) -> usize {
        let cap = self.shared.slots.len();
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);
        (read + cap - write - 1) % cap
    }
}

/// Read side, owned by the application
pub struct EventConsumer {
    shared: Arc<Shared>,
}

impl EventConsumer {
    /// Oldest packed event, or [`NO_EVENT`] when empty
    #[inline]
    pub fn pop(&mut self) -> u32 {
        let read = self.shared.read.load(Ordering::Relaxed);
        if read == self.shared.write.load(Ordering::Acquire) {
            return NO_EVENT;
        }
        let event = self.shared.slots[read].load(Ordering::Relaxed);
        self.shared.read.store(self.shared.next(read), Ordering::Release);
        event
    }

    /// Typed variant of [`pop`](Self::pop)
    pub fn pop_event(&mut self) -> Option<InboundEvent> {
        InboundEvent::unpack(self.pop())
    }

    pub fn len(&self) -> usize {
        let cap = self.shared.slots.len();
        let read = self.shared.read.load(Ordering::Relaxed);
        let write = self.shared.write.load(Ordering::Acquire);
        (write + cap - read) % cap
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
