//! Namespaced ids handed to the IDE.
//!
//! Breakpoints are `dotnet:<localId>`; inspectable objects are
//! `dotnet:<kind>:<n>` with kind `scope`, `object` or `array`.

use std::fmt;

/// Prefix of every id owned by the managed debugger.
pub const NAMESPACE: &str = "dotnet:";

/// True if `id` belongs to the managed debugger.
pub fn is_namespaced(id: &str) -> bool {
    id.starts_with(NAMESPACE)
}

/// IDE-facing id of a breakpoint.
pub fn breakpoint_id(local_id: u32) -> String {
    format!("{NAMESPACE}{local_id}")
}

/// Local id of a namespaced breakpoint id.
///
/// `None` for foreign ids, `Some(None)` for namespaced ids that do not name a
/// breakpoint.
pub fn parse_breakpoint_id(id: &str) -> Option<Option<u32>> {
    let local = id.strip_prefix(NAMESPACE)?;
    Some(local.parse().ok())
}

/// An inspectable managed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectId {
    /// Locals of a stack frame.
    Scope(u32),
    /// Members of an object.
    Object(i64),
    /// Elements of an array.
    Array(i64),
}

impl ObjectId {
    /// Parse a namespaced object id.
    pub fn parse(id: &str) -> Option<Self> {
        let rest = id.strip_prefix(NAMESPACE)?;
        let (kind, number) = rest.split_once(':')?;
        match kind {
            "scope" => number.parse().ok().map(ObjectId::Scope),
            "object" => number.parse().ok().map(ObjectId::Object),
            "array" => number.parse().ok().map(ObjectId::Array),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Scope(n) => write!(f, "{NAMESPACE}scope:{n}"),
            ObjectId::Object(n) => write!(f, "{NAMESPACE}object:{n}"),
            ObjectId::Array(n) => write!(f, "{NAMESPACE}array:{n}"),
        }
    }
}
