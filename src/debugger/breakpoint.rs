//! Managed breakpoints and their lifecycle.
//!
//! A breakpoint starts Pending while the runtime is not ready, becomes Active
//! once the runtime accepts it and Disabled when enabling fails. Only removal
//! takes a breakpoint out of Disabled, apart from a fresh runtime context,
//! which resets every breakpoint to Pending.

use regex::Regex;
use serde_json::{Value, json};
use std::fmt;

use super::ids;
use crate::symbols::{SourceFile, SourceLocation, is_dotnet_url};

/// Binding state of a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointState {
    /// Waiting for the runtime to become ready
    Pending,
    /// Enabled in the runtime
    Active,
    /// Enabling failed; only removal or a new context changes it
    Disabled,
}

/// Remote id of a breakpoint that is not bound in the runtime.
pub const NO_REMOTE_ID: i64 = -1;

/// A breakpoint set by the IDE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Proxy-assigned id, stable for the IDE.
    pub local_id: u32,
    /// Runtime-assigned id, [`NO_REMOTE_ID`] unless Active.
    pub remote_id: i64,
    /// Resolved source location.
    pub location: SourceLocation,
    pub state: BreakpointState,
}

impl Breakpoint {
    /// IDE-facing id.
    pub fn id(&self) -> String {
        ids::breakpoint_id(self.local_id)
    }

    /// Response to `Debugger.setBreakpointByUrl`.
    pub fn to_response(&self) -> Value {
        json!({
            "breakpointId": self.id(),
            "locations": [self.location.to_json()],
        })
    }

    fn activate(&mut self, remote_id: i64) {
        self.remote_id = remote_id;
        self.state = BreakpointState::Active;
    }

    /// Mark disabled and unbind. Returns the previous remote id, if bound.
    fn disable(&mut self) -> Option<i64> {
        self.state = BreakpointState::Disabled;
        let remote = std::mem::replace(&mut self.remote_id, NO_REMOTE_ID);
        (remote != NO_REMOTE_ID).then_some(remote)
    }
}

/// Every breakpoint of one debugging session.
#[derive(Debug)]
pub struct BreakpointTable {
    entries: Vec<Breakpoint>,
    next_local_id: u32,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_local_id: 1,
        }
    }
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, location: SourceLocation) -> &mut Breakpoint {
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.entries.push(Breakpoint {
            local_id,
            remote_id: NO_REMOTE_ID,
            location,
            state: BreakpointState::Pending,
        });
        let index = self.entries.len() - 1;
        &mut self.entries[index]
    }

    /// Add a breakpoint that waits for the runtime.
    pub fn insert_pending(&mut self, location: SourceLocation) -> &Breakpoint {
        self.allocate(location)
    }

    /// Add a breakpoint the runtime already accepted.
    pub fn insert_active(&mut self, location: SourceLocation, remote_id: i64) -> &Breakpoint {
        let breakpoint = self.allocate(location);
        breakpoint.activate(remote_id);
        breakpoint
    }

    pub fn get(&self, local_id: u32) -> Option<&Breakpoint> {
        self.entries.iter().find(|bp| bp.local_id == local_id)
    }

    /// The active breakpoint bound to `remote_id` in the runtime.
    pub fn by_remote_id(&self, remote_id: i64) -> Option<&Breakpoint> {
        if remote_id == NO_REMOTE_ID {
            return None;
        }
        self.entries.iter().find(|bp| bp.remote_id == remote_id)
    }

    /// Record a successful enable. Returns false if the breakpoint is gone.
    pub fn activate(&mut self, local_id: u32, remote_id: i64) -> bool {
        match self.entries.iter_mut().find(|bp| bp.local_id == local_id) {
            Some(bp) => {
                bp.activate(remote_id);
                true
            }
            None => false,
        }
    }

    /// Record a failed enable. Returns false if the breakpoint is gone.
    pub fn disable(&mut self, local_id: u32) -> bool {
        match self.entries.iter_mut().find(|bp| bp.local_id == local_id) {
            Some(bp) => {
                bp.disable();
                true
            }
            None => false,
        }
    }

    /// Remove a breakpoint. The returned breakpoint is Disabled; its remote id
    /// is returned alongside when it was bound.
    pub fn remove(&mut self, local_id: u32) -> Option<(Breakpoint, Option<i64>)> {
        let index = self.entries.iter().position(|bp| bp.local_id == local_id)?;
        let mut breakpoint = self.entries.remove(index);
        let remote = breakpoint.disable();
        Some((breakpoint, remote))
    }

    /// Forget every runtime binding: the runtime context was replaced.
    pub fn reset_all(&mut self) {
        for bp in &mut self.entries {
            bp.state = BreakpointState::Pending;
            bp.remote_id = NO_REMOTE_ID;
        }
    }

    /// Pending breakpoints, in creation order.
    pub fn pending(&self) -> Vec<(u32, SourceLocation)> {
        self.entries
            .iter()
            .filter(|bp| bp.state == BreakpointState::Pending)
            .map(|bp| (bp.local_id, bp.location.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which documents a breakpoint request targets.
#[derive(Debug, Clone)]
pub enum UrlTarget {
    /// A `dotnet://` document url, a document url, or a script id.
    Url(String),
    /// Pattern matched against document urls.
    Regex(Regex),
}

/// A `Debugger.setBreakpointByUrl` request. Positions are 0-based.
#[derive(Debug, Clone)]
pub struct BreakpointRequest {
    pub target: UrlTarget,
    pub line: u32,
    pub column: u32,
}

impl BreakpointRequest {
    /// Parse request parameters. `url` takes precedence over `urlRegex`;
    /// `columnNumber` defaults to 0.
    pub fn from_params(params: &Value) -> Option<Self> {
        let target = match params.get("url").and_then(Value::as_str) {
            Some(url) => UrlTarget::Url(url.to_owned()),
            None => {
                let pattern = params.get("urlRegex")?.as_str()?;
                match Regex::new(pattern) {
                    Ok(regex) => UrlTarget::Regex(regex),
                    Err(err) => {
                        tracing::debug!(pattern, error = %err, "ignoring invalid urlRegex");
                        return None;
                    }
                }
            }
        };
        let line = u32::try_from(params.get("lineNumber")?.as_u64()?).ok()?;
        let column = match params.get("columnNumber") {
            Some(column) => u32::try_from(column.as_u64()?).ok()?,
            None => 0,
        };
        Some(Self {
            target,
            line,
            column,
        })
    }

    /// True if the request names a managed document explicitly.
    pub fn is_dotnet(&self) -> bool {
        matches!(&self.target, UrlTarget::Url(url) if is_dotnet_url(url))
    }

    /// True if `file` is targeted by this request.
    pub fn matches(&self, file: &SourceFile) -> bool {
        match &self.target {
            UrlTarget::Url(url) => {
                url.eq_ignore_ascii_case(&file.dotnet_url)
                    || *url == file.url
                    || url.strip_prefix("file://") == Some(file.url.as_str())
                    || *url == file.id.to_string()
            }
            UrlTarget::Regex(regex) => {
                regex.is_match(&file.url) || regex.is_match(&file.dotnet_url)
            }
        }
    }
}

impl fmt::Display for BreakpointRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            UrlTarget::Url(url) => write!(f, "{url}")?,
            UrlTarget::Regex(regex) => write!(f, "/{regex}/")?,
        }
        write!(f, ":{}:{}", self.line, self.column)
    }
}
