use std::collections::VecDeque;

use playground_protocol::RawEvent;

/// Bounded, append-only event buffer for one session.
///
/// Once `capacity` is reached every append evicts the oldest event. Indexes
/// passed to [`EventLog::read`] are relative to the events currently held,
/// not to everything ever appended.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<RawEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Append one event; returns the log length afterwards.
    pub fn append(&mut self, event: RawEvent) -> usize {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.len()
    }

    /// Events at `[from, len)`.
    pub fn read(&self, from: usize) -> Vec<RawEvent> {
        self.events.iter().skip(from).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<RawEvent> {
        self.read(0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped by eviction so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
