//! Generic command/event relay between an IDE and a runtime.
//!
//! The relay forwards IDE commands to the runtime and runtime events and
//! responses back to the IDE. An [`Interceptor`] sees every command and event
//! first and may claim it.

pub mod correlator;
pub mod error;
pub mod handlers;
pub mod message;
pub mod proxy;
pub mod queue;
pub mod transport;

pub use correlator::{PendingCommand, PendingCommands, next_command_id};
pub use error::{ProtocolError, RelayError, RelayResult, TransportError};
pub use handlers::{
    CommandHandler, Disposition, EventHandler, HandlerFuture, HandlerTable, Interceptor,
    PassThrough,
};
pub use message::{CdpResult, Envelope, MessageId, SessionId, Side, encode_command, encode_event};
pub use proxy::{Relay, RelayHandle, ShutdownReason};
pub use queue::OutboundQueue;
pub use transport::{Connection, MemoryEndpoint, MessageSink, MessageSource, memory_pair};
