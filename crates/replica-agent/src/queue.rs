//! Inbound message buffer.

use crate::types::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Message>,
    blocked: bool,
}

/// Thread-safe FIFO of messages delivered by the controller.
///
/// While blocked, additions are discarded without any signal to the sender.
/// Every operation takes the same lock, so operations are totally ordered.
#[derive(Debug, Default)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message unless the queue is blocked. Returns whether it was kept.
    pub fn add(&self, message: Message) -> bool {
        let mut state = self.state.lock();
        if state.blocked {
            return false;
        }
        state.messages.push_back(message);
        true
    }

    /// Removes and returns the oldest message.
    pub fn pop(&self) -> Option<Message> {
        self.state.lock().messages.pop_front()
    }

    /// Drops every pending message.
    pub fn flush(&self) {
        self.state.lock().messages.clear();
    }

    pub fn block(&self) {
        self.state.lock().blocked = true;
    }

    pub fn unblock(&self) {
        self.state.lock().blocked = false;
    }

    pub fn is_blocked(&self) -> bool {
        self.state.lock().blocked
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }
}
