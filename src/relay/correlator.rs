//! Command/response correlation
//!
//! Outbound command ids come from one process-wide counter. Each outstanding
//! command owns a completion handle keyed by its [`MessageId`]; a response
//! resolves and removes exactly that entry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::error::{ProtocolError, RelayError};
use super::message::{CdpResult, MessageId, SessionId};

static NEXT_COMMAND_ID: AtomicI64 = AtomicI64::new(1);

/// Allocate a fresh, monotonically increasing command id.
pub fn next_command_id() -> i64 {
    NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed)
}

/// Table of commands awaiting a response.
#[derive(Debug, Default)]
pub struct PendingCommands {
    entries: Mutex<HashMap<MessageId, oneshot::Sender<CdpResult>>>,
}

impl PendingCommands {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id in `session` and register a completion handle for it.
    pub fn register(&self, session: &SessionId) -> (MessageId, PendingCommand) {
        let id = MessageId::new(session.clone(), next_command_id());
        let (sender, receiver) = oneshot::channel();
        let previous = self.entries.lock().insert(id.clone(), sender);
        debug_assert!(previous.is_none(), "command id {id} registered twice");
        (id, PendingCommand { receiver })
    }

    /// Resolve the command answered by a response.
    pub fn resolve(&self, id: &MessageId, result: CdpResult) -> Result<(), ProtocolError> {
        let sender = self
            .entries
            .lock()
            .remove(id)
            .ok_or_else(|| ProtocolError::UnknownResponse(id.clone()))?;
        // The waiter may have been dropped with its handler; nothing to deliver then.
        let _ = sender.send(result);
        Ok(())
    }

    /// Drop the completion handle for `id` without resolving it.
    pub fn forget(&self, id: &MessageId) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Drop every completion handle. Waiters observe [`RelayError::Closed`].
    pub fn abandon_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Number of outstanding commands.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True if `id` is outstanding.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.lock().contains_key(id)
    }
}

/// Future resolving to the result of one outstanding command.
#[derive(Debug)]
pub struct PendingCommand {
    receiver: oneshot::Receiver<CdpResult>,
}

impl Future for PendingCommand {
    type Output = Result<CdpResult, RelayError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| RelayError::Closed))
    }
}
