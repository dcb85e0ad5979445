//! Runtime introspection calls and marker names.
//!
//! The runtime exposes its debugger as functions on a global `MONO` object. The
//! proxy calls them with `Runtime.evaluate` and reads `result.value`.

use serde_json::{Value, json};

/// Object group for every evaluation issued by the proxy.
pub const OBJECT_GROUP: &str = "mono_debugger";

/// Native functions the runtime calls when a managed breakpoint is hit.
pub const BREAKPOINT_TRAMPOLINES: [&str; 2] = ["mono_wasm_fire_bp", "_mono_wasm_fire_bp"];

/// Native function the runtime calls once it is ready to be debugged.
pub const READY_SENTINEL: &str = "mono_wasm_runtime_ready";

/// Error code for a breakpoint request that resolves to no location.
pub const BREAKPOINT_NOT_FOUND: i64 = 100_000;

/// Error code for an enable call that returned no breakpoint id.
pub const BREAKPOINT_NOT_ENABLED: i64 = 100_001;

/// Kind of single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Into = 0,
    Out = 1,
    Over = 2,
}

/// Parameters of a `Runtime.evaluate` call for `expression`.
pub fn evaluate_params(expression: &str) -> Value {
    json!({
        "expression": expression,
        "objectGroup": OBJECT_GROUP,
        "includeCommandLineAPI": false,
        "silent": false,
        "returnByValue": true,
    })
}

pub const IS_RUNTIME_READY: &str = "MONO.mono_wasm_runtime_is_ready";
pub const GET_LOADED_FILES: &str = "MONO.mono_wasm_get_loaded_files()";
pub const CLEAR_ALL_BREAKPOINTS: &str = "MONO.mono_wasm_clear_all_breakpoints()";
pub const GET_CALL_STACK: &str = "MONO.mono_wasm_get_call_stack()";

pub fn set_breakpoint(assembly: &str, method_token: u32, offset: u32) -> String {
    // Json string literals are valid JavaScript string literals.
    let assembly = Value::String(assembly.to_owned());
    format!("MONO.mono_wasm_set_breakpoint({assembly}, {method_token}, {offset})")
}

pub fn remove_breakpoint(remote_id: i64) -> String {
    format!("MONO.mono_wasm_remove_breakpoint({remote_id})")
}

pub fn start_single_stepping(kind: StepKind) -> String {
    format!("MONO.mono_wasm_start_single_stepping({})", kind as i32)
}

pub fn get_variables(frame_id: u32, slots: &[i32]) -> String {
    let slots = slots
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("MONO.mono_wasm_get_variables({frame_id}, [ {slots} ])")
}

pub fn get_object_properties(object_id: i64) -> String {
    format!("MONO.mono_wasm_get_object_properties({object_id})")
}

pub fn get_array_values(array_id: i64) -> String {
    format!("MONO.mono_wasm_get_array_values({array_id})")
}

/// True if `function_name` is a breakpoint trampoline.
pub fn is_breakpoint_trampoline(function_name: &str) -> bool {
    BREAKPOINT_TRAMPOLINES.contains(&function_name)
}

/// True for native frames that belong to the interpreter itself.
pub fn is_interpreter_frame(frame: &Value) -> bool {
    let function_name = frame
        .get("functionName")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let url = frame.get("url").and_then(Value::as_str).unwrap_or_default();
    function_name.starts_with("wasm-function") || url.starts_with("wasm://wasm/")
}
