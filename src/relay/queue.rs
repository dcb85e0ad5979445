//! Per-socket outbound queue
//!
//! Serialises writes so that at most one send is in flight per socket. The head
//! of the queue is the message currently being transmitted; it is only removed
//! once the send completes.

use std::collections::VecDeque;
use std::sync::Arc;

/// Ordered list of messages waiting to be written to one socket.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<Arc<str>>,
}

impl OutboundQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message.
    ///
    /// Returns the message to start sending right away when the queue was idle,
    /// `None` when a send is already in flight (the message is drained later).
    pub fn enqueue(&mut self, message: impl Into<Arc<str>>) -> Option<Arc<str>> {
        self.pending.push_back(message.into());
        if self.pending.len() == 1 {
            self.pending.front().cloned()
        } else {
            None
        }
    }

    /// Mark the in-flight send as finished.
    ///
    /// Pops the completed head and returns the next message to send, if any.
    pub fn on_send_complete(&mut self) -> Option<Arc<str>> {
        debug_assert!(
            !self.pending.is_empty(),
            "send completed with nothing in flight"
        );
        self.pending.pop_front();
        self.pending.front().cloned()
    }

    /// True while a send is in flight.
    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of messages queued, including the one in flight.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
