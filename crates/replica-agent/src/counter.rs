//! Monotonic message identifier source.

use crate::types::{MessageId, ReplicaId};
use parking_lot::Mutex;

/// Process-local monotonic counter.
///
/// Identifiers are unique only within one counter and one process lifetime;
/// nothing is persisted.
#[derive(Debug, Default)]
pub struct Counter {
    next: Mutex<u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value and advances the counter.
    pub fn next(&self) -> u64 {
        let mut next = self.next.lock();
        let current = *next;
        *next += 1;
        current
    }

    pub fn reset(&self) {
        *self.next.lock() = 0;
    }

    /// Formats the next identifier for a message from `from` to `to`.
    pub fn next_id(&self, from: &ReplicaId, to: &ReplicaId) -> MessageId {
        MessageId::new(format!("{}_{}_{}", from, to, self.next()))
    }
}
