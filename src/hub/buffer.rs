//! Bounded event replay buffer.

use std::collections::VecDeque;

use crate::event::Event;

/// Drop-oldest ring of recent events for late-joiner replay.
///
/// The buffer never exceeds its capacity: pushing past it evicts the
/// oldest event rather than blocking the producer.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventBuffer {
    /// An empty buffer bounded at `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest if the buffer is full.
    pub fn push(&mut self, event: Event) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Buffered events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Configured bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all buffered events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
