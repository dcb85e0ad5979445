//! Managed debugging for the mono wasm runtime.
//!
//! [`DebuggerProxy`] plugs into the relay as an interceptor. It binds IDE
//! breakpoints to IL offsets, rewrites runtime pauses into managed call stacks
//! and answers variable inspection from the runtime's introspection calls.

pub mod breakpoint;
pub mod commands;
pub mod frames;
pub mod ids;
pub mod proxy;
pub mod variables;

pub use breakpoint::{Breakpoint, BreakpointRequest, BreakpointState, BreakpointTable, UrlTarget};
pub use commands::StepKind;
pub use frames::{CallStack, Frame, ManagedCallStack, ManagedFrame};
pub use ids::ObjectId;
pub use proxy::{DebuggerProxy, ExecutionContext};
