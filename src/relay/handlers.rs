//! Message interception
//!
//! The relay asks an [`Interceptor`] about every IDE command and runtime event
//! before applying its default forwarding. [`HandlerTable`] is the standard
//! interceptor: a map from method name to handler functions sharing one state
//! value.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::message::{MessageId, SessionId};
use super::proxy::RelayHandle;

/// What the relay should do once a claimed message has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The handler took care of the message (and of any response it needs).
    Handled,
    /// Apply the default behaviour to the original message as well.
    Forward,
}

/// Future produced by a handler that claimed a message.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Disposition>>;

/// Decides which messages are handled specially.
///
/// Returning `None` leaves the message to the relay's default behaviour, applied
/// immediately so ordering with neighbouring messages is preserved.
pub trait Interceptor: Send + Sync + 'static {
    /// Inspect a command received from the IDE.
    fn on_command(
        &self,
        relay: &RelayHandle,
        id: &MessageId,
        method: &str,
        params: &Value,
    ) -> Option<HandlerFuture>;

    /// Inspect an event received from the runtime.
    fn on_event(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
        method: &str,
        params: &Value,
    ) -> Option<HandlerFuture>;
}

/// Interceptor that claims nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl Interceptor for PassThrough {
    fn on_command(
        &self,
        _: &RelayHandle,
        _: &MessageId,
        _: &str,
        _: &Value,
    ) -> Option<HandlerFuture> {
        None
    }

    fn on_event(
        &self,
        _: &RelayHandle,
        _: &SessionId,
        _: &str,
        _: &Value,
    ) -> Option<HandlerFuture> {
        None
    }
}

/// Handler for an IDE command.
pub type CommandHandler<S> =
    fn(&Arc<S>, &RelayHandle, &MessageId, &Value) -> Option<HandlerFuture>;

/// Handler for a runtime event.
pub type EventHandler<S> =
    fn(&Arc<S>, &RelayHandle, &SessionId, &Value) -> Option<HandlerFuture>;

/// Method-name keyed handler table over shared state `S`.
pub struct HandlerTable<S> {
    state: Arc<S>,
    commands: HashMap<&'static str, CommandHandler<S>>,
    events: HashMap<&'static str, EventHandler<S>>,
}

impl<S: Send + Sync + 'static> HandlerTable<S> {
    /// Create an empty table over `state`.
    pub fn new(state: Arc<S>) -> Self {
        Self {
            state,
            commands: HashMap::new(),
            events: HashMap::new(),
        }
    }

    /// Register a command handler for `method`.
    pub fn command(mut self, method: &'static str, handler: CommandHandler<S>) -> Self {
        self.commands.insert(method, handler);
        self
    }

    /// Register an event handler for `method`.
    pub fn event(mut self, method: &'static str, handler: EventHandler<S>) -> Self {
        self.events.insert(method, handler);
        self
    }

    /// Shared state handed to every handler.
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Methods with a registered command handler.
    pub fn command_methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    /// Methods with a registered event handler.
    pub fn event_methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.events.keys().copied()
    }
}

impl<S: Send + Sync + 'static> Interceptor for HandlerTable<S> {
    fn on_command(
        &self,
        relay: &RelayHandle,
        id: &MessageId,
        method: &str,
        params: &Value,
    ) -> Option<HandlerFuture> {
        let handler = self.commands.get(method)?;
        handler(&self.state, relay, id, params)
    }

    fn on_event(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
        method: &str,
        params: &Value,
    ) -> Option<HandlerFuture> {
        let handler = self.events.get(method)?;
        handler(&self.state, relay, session, params)
    }
}
