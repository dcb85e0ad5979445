//! Managed call stacks.
//!
//! On a breakpoint hit the runtime reports its managed frames as
//! `{breakpoint_id, frames: [{il_pos, method_token, assembly_name}]}`. Each
//! frame is resolved through the symbol store; unresolvable frames are skipped.

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::commands::{is_breakpoint_trampoline, is_interpreter_frame};
use super::ids::ObjectId;
use crate::symbols::{MethodInfo, SourceLocation, SymbolStore};

/// One managed frame as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagedFrame {
    pub il_pos: u32,
    pub method_token: u32,
    pub assembly_name: String,
}

/// Reply of the managed call-stack introspection call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagedCallStack {
    pub breakpoint_id: i64,
    #[serde(default)]
    pub frames: Vec<ManagedFrame>,
}

impl ManagedCallStack {
    /// Decode the evaluated value. `None` when it is not a call stack.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// A resolved managed frame. Ids are assigned innermost first from 0.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: u32,
    pub method: Arc<MethodInfo>,
    pub location: SourceLocation,
}

impl Frame {
    /// IL offset the frame's location is bound to.
    pub fn il_offset(&self) -> u32 {
        self.location.il_offset().unwrap_or_default()
    }

    fn to_call_frame(&self, store: &dyn SymbolStore) -> Value {
        let scope = ObjectId::Scope(self.id).to_string();
        let start = self.method.start_location().map(|l| l.to_json());
        let end = self.method.end_location().map(|l| l.to_json());
        let url = store
            .file_by_id(&self.location.id)
            .map(|file| file.url.clone())
            .unwrap_or_default();
        json!({
            "functionName": self.method.name,
            "callFrameId": scope,
            "functionLocation": start,
            "location": self.location.to_json(),
            "url": url,
            "scopeChain": [{
                "type": "local",
                "object": {
                    "type": "object",
                    "className": "Object",
                    "description": "Object",
                    "objectId": scope,
                },
                "name": self.method.name,
                "startLocation": start,
                "endLocation": end,
            }],
        })
    }
}

/// Frames of the current pause.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn get(&self, id: u32) -> Option<&Frame> {
        self.frames.iter().find(|frame| frame.id == id)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Resolve managed frames against the store.
pub fn resolve_frames(managed: &[ManagedFrame], store: &dyn SymbolStore) -> CallStack {
    let mut frames = Vec::new();
    for frame in managed {
        let Some(assembly) = store.assembly_by_name(&frame.assembly_name) else {
            tracing::info!(assembly = %frame.assembly_name, "unable to find assembly");
            continue;
        };
        let Some(method) = assembly.method_by_token(frame.method_token) else {
            tracing::info!(
                assembly = %frame.assembly_name,
                token = frame.method_token,
                il_pos = frame.il_pos,
                "unable to find method"
            );
            continue;
        };
        let Some(location) = method.location_by_il(frame.il_pos) else {
            tracing::debug!(method = %method.name, il_pos = frame.il_pos, "no source location");
            continue;
        };
        tracing::debug!(method = %method.name, %location, "resolved frame");
        frames.push(Frame {
            id: frames.len() as u32,
            method: Arc::clone(method),
            location,
        });
    }
    CallStack { frames }
}

/// Rewrite the native frames of a pause.
///
/// The trampoline frame is replaced by the resolved managed frames, interpreter
/// frames are dropped and every other native frame is kept in place.
pub fn translate_call_frames(
    native: &[Value],
    managed: &ManagedCallStack,
    store: &dyn SymbolStore,
) -> (CallStack, Vec<Value>) {
    let mut stack = CallStack::default();
    let mut call_frames = Vec::new();
    for frame in native {
        let function_name = frame
            .get("functionName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if is_breakpoint_trampoline(function_name) {
            stack = resolve_frames(&managed.frames, store);
            call_frames.extend(stack.frames.iter().map(|f| f.to_call_frame(store)));
        } else if !is_interpreter_frame(frame) {
            call_frames.push(frame.clone());
        }
    }
    (stack, call_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{AssemblyDefinition, AssemblyInfo, DebugStore, SequencePoint};
    use crate::symbols::model::{DocumentDefinition, MethodDefinition};

    fn store() -> DebugStore {
        let method = |token, name: &str, line| MethodDefinition {
            token,
            name: name.into(),
            document: 0,
            sequence_points: vec![SequencePoint {
                offset: 0,
                start_line: line,
                start_column: 9,
                end_line: line,
                end_column: 20,
            }],
            parameters: Vec::new(),
            scopes: Vec::new(),
        };
        let definition = AssemblyDefinition {
            name: "App".into(),
            documents: vec![DocumentDefinition {
                name: "/src/Program.cs".into(),
                hash: None,
            }],
            methods: vec![method(1, "Inner", 5), method(2, "Outer", 12)],
        };
        DebugStore::new(vec![Arc::new(AssemblyInfo::new(0, "App.dll", definition))])
    }

    fn managed() -> ManagedCallStack {
        ManagedCallStack::from_value(&json!({
            "breakpoint_id": 3,
            "frames": [
                {"il_pos": 4, "method_token": 1, "assembly_name": "App.dll"},
                {"il_pos": 0, "method_token": 9, "assembly_name": "App.dll"},
                {"il_pos": 0, "method_token": 1, "assembly_name": "mscorlib.dll"},
                {"il_pos": 2, "method_token": 2, "assembly_name": "App.dll"},
            ]
        }))
        .unwrap()
    }

    #[test]
    fn call_stack_reply_must_be_an_object_with_breakpoint_id() {
        assert!(ManagedCallStack::from_value(&json!(null)).is_none());
        assert!(ManagedCallStack::from_value(&json!("oops")).is_none());
        assert!(ManagedCallStack::from_value(&json!({"frames": []})).is_none());
        assert_eq!(managed().breakpoint_id, 3);
    }

    #[test]
    fn unresolvable_frames_are_skipped() {
        let stack = resolve_frames(&managed().frames, &store());
        let names: Vec<_> = stack.frames().iter().map(|f| (f.id, f.method.name.as_str())).collect();
        assert_eq!(names, vec![(0, "Inner"), (1, "Outer")]);
        assert_eq!(stack.get(1).map(|f| f.location.line), Some(11));
    }

    #[test]
    fn trampoline_is_replaced_and_interpreter_frames_dropped() {
        let native = vec![
            json!({"functionName": "_mono_wasm_fire_bp", "url": "http://app/dotnet.js"}),
            json!({"functionName": "wasm-function[1]", "url": "wasm://wasm/abc"}),
            json!({"functionName": "onClick", "url": "http://app/main.js"}),
        ];
        let store = store();
        let (stack, frames) = translate_call_frames(&native, &managed(), &store);
        assert_eq!(stack.len(), 2);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["functionName"], "Inner");
        assert_eq!(frames[0]["callFrameId"], "dotnet:scope:0");
        assert_eq!(frames[0]["url"], "/src/Program.cs");
        assert_eq!(frames[0]["location"]["scriptId"], "dotnet://0_0");
        assert_eq!(frames[0]["scopeChain"][0]["object"]["objectId"], "dotnet:scope:0");
        assert_eq!(frames[1]["functionName"], "Outer");
        assert_eq!(frames[2]["functionName"], "onClick");
    }
}
