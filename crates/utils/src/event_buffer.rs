//! Bounded in-memory event history.
//!
//! Every run keeps a capped ring of the events it has emitted so a client
//! that reconnects mid-run can replay recent history before tailing the
//! live stream. Once the cap is reached the oldest entry is evicted first,
//! which bounds memory regardless of how verbose the subprocess is.

use std::collections::VecDeque;
use std::sync::RwLock;

pub struct EventBuffer<T> {
    capacity: usize,
    entries: RwLock<VecDeque<T>>,
}

impl<T: Clone> EventBuffer<T> {
    /// Creates a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an entry, evicting the oldest one if the buffer is full.
    pub fn push(&self, entry: T) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns the buffered entries, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
