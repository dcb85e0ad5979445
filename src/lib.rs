//! Devtools Bridge – a debugger-protocol proxy for the mono wasm runtime
//!
//! The bridge sits between an IDE speaking the DevTools protocol and a browser
//! hosting the runtime:
//! - Commands, responses and events are relayed between the two sockets, with
//!   per-session command correlation
//! - Breakpoints set on managed source documents are bound to IL offsets once
//!   the runtime is ready
//! - Interpreter pauses are rewritten into managed call stacks, and scopes and
//!   objects are inspected through the runtime's introspection calls

#![warn(rust_2018_idioms)]

pub mod config;
pub mod debugger;
pub mod relay;
pub mod server;
pub mod symbols;

pub use config::{ConfigError, ProxyConfig, TransportKind};
pub use debugger::DebuggerProxy;
pub use relay::{Relay, RelayError, RelayHandle, ShutdownReason};
pub use server::{Server, ServerError};

/// Current version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
