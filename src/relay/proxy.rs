//! Generic protocol relay between an IDE socket and a runtime socket.
//!
//! One [`Relay`] serves one client connection. Everything it does is
//! multiplexed on a single wait loop: the two read pumps, at most one send per
//! socket, the handler futures spawned for intercepted messages, and the queue
//! of messages produced through [`RelayHandle`]. Nothing is spawned onto other
//! tasks, so handler state only needs short, non-awaiting critical sections.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::correlator::{PendingCommand, PendingCommands};
use super::error::{RelayError, RelayResult, TransportError};
use super::handlers::{Disposition, Interceptor, PassThrough};
use super::message::{
    CdpResult, Envelope, MessageId, SessionId, Side, encode_command, encode_event,
};
use super::queue::OutboundQueue;
use super::transport::{Connection, MessageSink, MessageSource};

/// Why a relay stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The IDE closed its socket.
    IdeClosed,
    /// The runtime closed its socket.
    RuntimeClosed,
    /// [`RelayHandle::close`] was called.
    Cancelled,
}

struct Outbound {
    side: Side,
    text: String,
}

struct Shared {
    pending: PendingCommands,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

/// Cloneable handle used by handlers to talk through the relay.
#[derive(Clone)]
pub struct RelayHandle {
    shared: Arc<Shared>,
}

impl RelayHandle {
    /// Send a command to the runtime and wait for its response.
    ///
    /// The command is queued before this returns; awaiting the result never
    /// blocks the relay's pumps.
    pub fn send_command(
        &self,
        session: impl AsRef<SessionId>,
        method: &str,
        params: Value,
    ) -> PendingCommand {
        let (id, pending) = self.shared.pending.register(session.as_ref());
        let message = encode_command(&id, method, params);
        if !self.push(Side::Runtime, &message) {
            // Relay is gone: drop the handle so the waiter sees `Closed`.
            self.shared.pending.forget(&id);
        }
        pending
    }

    /// Send an event to the IDE.
    pub fn send_event(&self, session: impl AsRef<SessionId>, method: &str, params: Value) {
        let message = encode_event(session.as_ref(), method, params);
        self.push(Side::Ide, &message);
    }

    /// Answer an IDE command.
    pub fn send_response(&self, id: &MessageId, result: CdpResult) {
        if result.is_err() {
            tracing::error!(command = %id, "sending error response {result}");
        }
        let message = result.to_response(id);
        self.push(Side::Ide, &message);
    }

    /// Ask the relay to shut down.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    /// True once shutdown has been requested or completed.
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Number of commands sent to the runtime that are still unanswered.
    pub fn pending_commands(&self) -> usize {
        self.shared.pending.len()
    }

    fn push(&self, side: Side, message: &Value) -> bool {
        let text = message.to_string();
        tracing::trace!(target: "protocol", "send-{side}: {text}");
        if self.shared.outbound.send(Outbound { side, text }).is_err() {
            tracing::debug!(%side, "relay closed, dropping outbound message");
            return false;
        }
        true
    }
}

type ReadOutcome = (
    Side,
    Box<dyn MessageSource>,
    Result<Option<String>, TransportError>,
);
type SendOutcome = (Side, Box<dyn MessageSink>, Result<(), TransportError>);
type Task = BoxFuture<'static, anyhow::Result<()>>;

/// Bidirectional relay with selective interception.
pub struct Relay {
    ide: Connection,
    runtime: Connection,
    interceptor: Arc<dyn Interceptor>,
    handle: RelayHandle,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl Relay {
    /// Create a relay that consults `interceptor` before default forwarding.
    pub fn new(ide: Connection, runtime: Connection, interceptor: Arc<dyn Interceptor>) -> Self {
        let (sender, outbound) = mpsc::unbounded_channel();
        let handle = RelayHandle {
            shared: Arc::new(Shared {
                pending: PendingCommands::new(),
                outbound: sender,
                cancel: CancellationToken::new(),
            }),
        };
        Self {
            ide,
            runtime,
            interceptor,
            handle,
            outbound,
        }
    }

    /// Create a relay that forwards everything.
    pub fn passthrough(ide: Connection, runtime: Connection) -> Self {
        Self::new(ide, runtime, Arc::new(PassThrough))
    }

    /// Handle for sending through this relay and closing it.
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Pump both sockets until either closes, the relay is cancelled, or a
    /// handler fails.
    pub async fn run(self) -> RelayResult<ShutdownReason> {
        let Relay {
            ide,
            runtime,
            interceptor,
            handle,
            mut outbound,
        } = self;
        let cancel = handle.shared.cancel.clone();

        let mut pump = Pump {
            handle: handle.clone(),
            interceptor,
            queues: [OutboundQueue::new(), OutboundQueue::new()],
            sinks: [Some(ide.sink), Some(runtime.sink)],
            reads: FuturesUnordered::new(),
            sends: FuturesUnordered::new(),
            tasks: FuturesUnordered::new(),
        };
        pump.reads.push(read_next(Side::Ide, ide.source));
        pump.reads.push(read_next(Side::Runtime, runtime.source));

        tracing::info!("relay started");

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(ShutdownReason::Cancelled),
                Some((side, source, result)) = pump.reads.next() => match result {
                    Ok(Some(text)) => {
                        pump.reads.push(read_next(side, source));
                        pump.dispatch(side, &text);
                    }
                    Ok(None) => {
                        tracing::info!(%side, "socket closed");
                        break Ok(match side {
                            Side::Ide => ShutdownReason::IdeClosed,
                            Side::Runtime => ShutdownReason::RuntimeClosed,
                        });
                    }
                    Err(source) => break Err(RelayError::Transport { side, source }),
                },
                Some((side, sink, result)) = pump.sends.next() => {
                    if let Err(source) = result {
                        break Err(RelayError::Transport { side, source });
                    }
                    pump.sinks[side.index()] = Some(sink);
                    if let Some(next) = pump.queues[side.index()].on_send_complete() {
                        pump.start_send(side, next);
                    }
                }
                Some(result) = pump.tasks.next() => {
                    if let Err(err) = result {
                        tracing::error!(
                            error = %format!("{err:#}"),
                            "handler failed, shutting down"
                        );
                        break Err(RelayError::Handler(err));
                    }
                }
                Some(message) = outbound.recv() => pump.enqueue(message),
            }
        };

        // Teardown: nothing new may be queued, every waiter is released, and
        // the idle sockets are closed. In-flight sends are dropped with their sinks.
        cancel.cancel();
        outbound.close();
        let abandoned = handle.shared.pending.abandon_all();
        if abandoned > 0 {
            tracing::debug!(abandoned, "released unanswered commands");
        }
        pump.tasks.clear();
        pump.reads.clear();
        pump.sends.clear();
        for sink in pump.sinks.iter_mut().flatten() {
            if let Err(err) = sink.close().await {
                tracing::debug!(error = %err, "error closing socket");
            }
        }

        match &outcome {
            Ok(reason) => tracing::info!(?reason, "relay stopped"),
            Err(err) => tracing::warn!(error = %err, "relay stopped with error"),
        }
        outcome
    }
}

struct Pump {
    handle: RelayHandle,
    interceptor: Arc<dyn Interceptor>,
    queues: [OutboundQueue; 2],
    sinks: [Option<Box<dyn MessageSink>>; 2],
    reads: FuturesUnordered<BoxFuture<'static, ReadOutcome>>,
    sends: FuturesUnordered<BoxFuture<'static, SendOutcome>>,
    tasks: FuturesUnordered<Task>,
}

impl Pump {
    fn dispatch(&mut self, side: Side, text: &str) {
        tracing::trace!(target: "protocol", "{side}: {text}");
        let envelope = match Envelope::decode(side, text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(%side, error = %err, "dropping malformed message");
                return;
            }
        };

        match envelope {
            Envelope::Command { id, method, params } => self.on_command(id, method, params),
            Envelope::Event {
                session,
                method,
                params,
            } => self.on_event(session, method, params),
            Envelope::Response { id, result } => {
                if let Err(err) = self.handle.shared.pending.resolve(&id, result) {
                    tracing::error!(error = %err, "protocol error");
                }
            }
        }
    }

    fn on_command(&mut self, id: MessageId, method: String, params: Value) {
        match self
            .interceptor
            .on_command(&self.handle, &id, &method, &params)
        {
            Some(handler) => {
                let handle = self.handle.clone();
                self.tasks.push(Box::pin(async move {
                    if handler.await? == Disposition::Forward {
                        forward_command(&handle, id, &method, params).await?;
                    }
                    Ok(())
                }));
            }
            None => {
                let task = forward_command(&self.handle, id, &method, params);
                self.tasks.push(task);
            }
        }
    }

    fn on_event(&mut self, session: SessionId, method: String, params: Value) {
        match self
            .interceptor
            .on_event(&self.handle, &session, &method, &params)
        {
            Some(handler) => {
                let handle = self.handle.clone();
                self.tasks.push(Box::pin(async move {
                    if handler.await? == Disposition::Forward {
                        handle.send_event(&session, &method, params);
                    }
                    Ok(())
                }));
            }
            None => self.handle.send_event(&session, &method, params),
        }
    }

    fn enqueue(&mut self, message: Outbound) {
        let side = message.side;
        if let Some(first) = self.queues[side.index()].enqueue(message.text) {
            self.start_send(side, first);
        }
    }

    fn start_send(&mut self, side: Side, text: Arc<str>) {
        match self.sinks[side.index()].take() {
            Some(sink) => self.sends.push(send_next(side, sink, text)),
            None => tracing::error!(%side, "send started while another is in flight"),
        }
    }
}

fn read_next(side: Side, mut source: Box<dyn MessageSource>) -> BoxFuture<'static, ReadOutcome> {
    Box::pin(async move {
        let result = source.recv().await;
        (side, source, result)
    })
}

fn send_next(
    side: Side,
    mut sink: Box<dyn MessageSink>,
    text: Arc<str>,
) -> BoxFuture<'static, SendOutcome> {
    Box::pin(async move {
        let result = sink.send(&text).await;
        (side, sink, result)
    })
}

/// Relay a command to the runtime and its result back to the IDE under the
/// original id. The command is queued immediately.
fn forward_command(handle: &RelayHandle, id: MessageId, method: &str, params: Value) -> Task {
    let pending = handle.send_command(&id, method, params);
    let handle = handle.clone();
    Box::pin(async move {
        let result = pending.await?;
        handle.send_response(&id, result);
        Ok(())
    })
}
