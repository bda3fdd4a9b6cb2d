//! Bounded, thread-safe event buffer
//!
//! Every enqueued event gets a sequence id from a counter that only moves
//! forward. A flush takes a [`Snapshot`] (contents plus the id of the tail,
//! the "mark"), sends it without holding the lock, and on success calls
//! [`EventBuffer::drop_through`] with that mark. Events enqueued in the
//! meantime carry larger ids and survive the drop.
//!
//! When full, the oldest event is evicted to make room, whether or not it
//! was ever published.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::event::Event;

/// Event plus the id it was assigned on enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedEvent {
    pub sequence_id: u64,
    pub event: Event,
}

/// Point-in-time copy of the buffer contents
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Buffered events in insertion order
    pub events: Vec<BufferedEvent>,
    /// Sequence id of the newest event, `None` when the buffer was empty
    pub mark: Option<u64>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The events alone, in order, ready for encoding
    pub fn payload(&self) -> Vec<&Event> {
        self.events.iter().map(|b| &b.event).collect()
    }
}

struct Ring {
    entries: VecDeque<BufferedEvent>,
    next_sequence_id: u64,
    evicted: u64,
}

/// FIFO buffer with a fixed capacity and monotonic sequence ids
pub struct EventBuffer {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl EventBuffer {
    /// Create an empty buffer. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                next_sequence_id: 0,
                evicted: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // A panic while holding the lock cannot leave the ring half-updated,
        // so a poisoned lock is still usable.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event, evicting the oldest one when full.
    ///
    /// Returns the sequence id assigned to the event.
    pub fn enqueue(&self, event: Event) -> u64 {
        let mut ring = self.lock();
        if ring.entries.len() >= self.capacity {
            ring.entries.pop_front();
            ring.evicted += 1;
        }
        let sequence_id = ring.next_sequence_id;
        ring.next_sequence_id += 1;
        ring.entries.push_back(BufferedEvent { sequence_id, event });
        sequence_id
    }

    /// Copy the current contents and the high-water mark
    pub fn snapshot(&self) -> Snapshot {
        let ring = self.lock();
        Snapshot {
            events: ring.entries.iter().cloned().collect(),
            mark: ring.entries.back().map(|b| b.sequence_id),
        }
    }

    /// Remove events from the head whose id is `<= mark`.
    ///
    /// Returns how many events were removed. Calling it again with the same
    /// or a lower mark removes nothing.
    pub fn drop_through(&self, mark: u64) -> usize {
        let mut ring = self.lock();
        let mut dropped = 0;
        while ring
            .entries
            .front()
            .is_some_and(|head| head.sequence_id <= mark)
        {
            ring.entries.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of events lost to overflow
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Id the next enqueued event will receive
    pub fn next_sequence_id(&self) -> u64 {
        self.lock().next_sequence_id
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.lock();
        f.debug_struct("EventBuffer")
            .field("capacity", &self.capacity)
            .field("len", &ring.entries.len())
            .field("next_sequence_id", &ring.next_sequence_id)
            .field("evicted", &ring.evicted)
            .finish()
    }
}
