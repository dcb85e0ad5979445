mod common;

use common::{
    APP_DLL, APP_PDB, Harness, MAIN_TOKEN, app_loader, app_manifest, command,
    default_context_created, paused_in,
};
use devtools_bridge::debugger::{BreakpointState, DebuggerProxy};
use devtools_bridge::symbols::{AssemblyDefinition, AssemblyInfo, DebugStore, SymbolStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

const DOCUMENT: &str = "/src/App/Program.cs";
const DOTNET_URL: &str = "dotnet://App/src/App/Program.cs";

fn set_breakpoint(id: i64, url: &str, line: u32) -> Value {
    json!({
        "id": id,
        "method": "Debugger.setBreakpointByUrl",
        "params": {"url": url, "lineNumber": line, "columnNumber": 8},
    })
}

fn remove_breakpoint(id: i64, breakpoint_id: &str) -> Value {
    command(id, "Debugger.removeBreakpoint", json!({ "breakpointId": breakpoint_id }))
}

fn get_properties(id: i64, object_id: &str) -> Value {
    command(id, "Runtime.getProperties", json!({ "objectId": object_id }))
}

fn script_source(id: i64, script_id: &str) -> Value {
    command(id, "Debugger.getScriptSource", json!({ "scriptId": script_id }))
}

fn enable_expression(offset: u32) -> String {
    format!("MONO.mono_wasm_set_breakpoint(\"App\", {MAIN_TOKEN}, {offset})")
}

/// Announce a default context and load symbols; the runtime answers the
/// readiness check with `ready`.
async fn attach(harness: &mut Harness, context: i64, ready: bool) {
    harness.runtime_send(default_context_created(context));
    let event = harness.expect_event("Runtime.executionContextCreated").await;
    assert_eq!(event["params"]["context"]["id"], context);

    let files = harness.expect_evaluate("MONO.mono_wasm_get_loaded_files()").await;
    harness.reply_value(&files, json!([APP_DLL, APP_PDB, "http://app/_framework/dotnet.wasm"]));
    let ready_check = harness.expect_evaluate("MONO.mono_wasm_runtime_is_ready").await;
    harness.reply_value(&ready_check, json!(ready));
}

/// The documents announcement and breakpoint reset every ready handshake starts with.
async fn expect_handshake_prefix(harness: &mut Harness, context: i64) {
    let parsed = harness.expect_event("Debugger.scriptParsed").await;
    assert_eq!(parsed["params"]["scriptId"], "dotnet://0_0");
    assert_eq!(parsed["params"]["url"], DOCUMENT);
    assert_eq!(parsed["params"]["dotNetUrl"], DOTNET_URL);
    assert_eq!(parsed["params"]["executionContextId"], context);
    assert_eq!(parsed["params"]["executionContextAuxData"]["frameId"], "F1");

    let clear = harness.expect_evaluate("MONO.mono_wasm_clear_all_breakpoints()").await;
    harness.reply_value(&clear, json!(true));
}

fn store_for(document: &str) -> Arc<dyn SymbolStore> {
    let definition: AssemblyDefinition = serde_json::from_value(app_manifest(document)).unwrap();
    Arc::new(DebugStore::new(vec![Arc::new(AssemblyInfo::new(0, APP_DLL, definition))]))
}

#[tokio::test]
async fn pending_breakpoint_binds_on_ready_and_is_hit() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    attach(&mut harness, 1, false).await;
    assert!(!proxy.is_runtime_ready());

    harness.ide_send(set_breakpoint(10, DOTNET_URL, 10));
    let response = harness.expect_response(10).await;
    assert_eq!(
        response["result"],
        json!({
            "breakpointId": "dotnet:1",
            "locations": [{"scriptId": "dotnet://0_0", "lineNumber": 10, "columnNumber": 8}],
        })
    );
    assert_eq!(proxy.breakpoints()[0].state, BreakpointState::Pending);

    // The runtime reports readiness by pausing in the sentinel.
    harness.runtime_send(paused_in("mono_wasm_runtime_ready"));
    expect_handshake_prefix(&mut harness, 1).await;
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, json!(42));
    let resume = harness.expect_command("Debugger.resume").await;
    harness.reply(&resume, json!({}));
    harness.expect_event("Mono.runtimeReady").await;

    assert!(proxy.is_runtime_ready());
    let breakpoint = &proxy.breakpoints()[0];
    assert_eq!(breakpoint.state, BreakpointState::Active);
    assert_eq!(breakpoint.remote_id, 42);

    // Breakpoint hit.
    harness.runtime_send(paused_in("_mono_wasm_fire_bp"));
    let stack = harness.expect_evaluate("MONO.mono_wasm_get_call_stack()").await;
    harness.reply_value(
        &stack,
        json!({
            "breakpoint_id": 42,
            "frames": [
                {"il_pos": 6, "method_token": MAIN_TOKEN, "assembly_name": "App.dll"},
                {"il_pos": 0, "method_token": 77, "assembly_name": "System.Private.CoreLib.dll"},
            ],
        }),
    );
    let paused = harness.expect_event("Debugger.paused").await;
    assert_eq!(paused["params"]["reason"], "other");
    assert_eq!(paused["params"]["hitBreakpoints"], json!(["dotnet:1"]));
    let frames = paused["params"]["callFrames"].as_array().unwrap();
    let names: Vec<_> = frames.iter().map(|f| f["functionName"].clone()).collect();
    assert_eq!(names, vec![json!("Main"), json!("onClick")]);
    assert_eq!(frames[0]["callFrameId"], "dotnet:scope:0");
    assert_eq!(frames[0]["location"]["lineNumber"], 10);
    assert_eq!(frames[0]["functionLocation"]["lineNumber"], 9);
    assert_eq!(proxy.call_stack().map(|stack| stack.len()), Some(1));

    // Locals of the top frame: parameters, then locals live at IL offset 6.
    harness.ide_send(get_properties(11, "dotnet:scope:0"));
    let vars = harness.expect_evaluate("MONO.mono_wasm_get_variables(0, [ -1, 0 ])").await;
    harness.reply_value(
        &vars,
        json!([
            {"value": {"type": "object", "className": "System.String[]",
                       "description": "System.String[]"}},
            {"value": {"type": "number", "value": 3}},
        ]),
    );
    let response = harness.expect_response(11).await;
    assert_eq!(
        response["result"]["result"],
        json!([
            {"name": "args", "value": {"type": "object", "className": "System.String[]",
                                       "description": "System.String[]"}},
            {"name": "count", "value": {"type": "number", "value": 3, "description": "3"}},
        ])
    );

    // Step over: arm stepping, answer the IDE, resume.
    harness.ide_send(json!({"id": 12, "method": "Debugger.stepOver"}));
    let step = harness.expect_evaluate("MONO.mono_wasm_start_single_stepping(2)").await;
    harness.reply_value(&step, json!(true));
    assert_eq!(harness.expect_response(12).await["result"], json!({}));
    let resume = harness.expect_command("Debugger.resume").await;
    harness.reply(&resume, json!({}));
    assert!(proxy.call_stack().is_none());

    // Without a managed pause stepping is the runtime's business.
    harness.ide_send(json!({"id": 13, "method": "Debugger.stepOver"}));
    let forwarded = harness.expect_command("Debugger.stepOver").await;
    harness.reply(&forwarded, json!({}));
    harness.expect_response(13).await;

    harness.finish().await.unwrap();
}

/// Runtime already running, with `dotnet:1` on line 10 bound to remote 7.
async fn ready_with_breakpoint(harness: &mut Harness) {
    attach(harness, 1, true).await;
    expect_handshake_prefix(harness, 1).await;
    harness.expect_event("Mono.runtimeReady").await;

    harness.ide_send(set_breakpoint(1, DOTNET_URL, 10));
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, json!(7));
    harness.expect_response(1).await;
}

/// Pause on remote breakpoint 7 inside `Main`.
async fn hit_breakpoint(harness: &mut Harness) {
    harness.runtime_send(paused_in("mono_wasm_fire_bp"));
    let stack = harness.expect_evaluate("MONO.mono_wasm_get_call_stack()").await;
    harness.reply_value(
        &stack,
        json!({
            "breakpoint_id": 7,
            "frames": [{"il_pos": 6, "method_token": MAIN_TOKEN, "assembly_name": "App.dll"}],
        }),
    );
    let paused = harness.expect_event("Debugger.paused").await;
    assert_eq!(paused["params"]["hitBreakpoints"], json!(["dotnet:1"]));
}

#[tokio::test]
async fn resume_discards_the_call_stack() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);
    ready_with_breakpoint(&mut harness).await;
    hit_breakpoint(&mut harness).await;
    assert!(proxy.call_stack().is_some());

    harness.ide_send(command(2, "Debugger.resume", json!({"terminateOnResume": false})));
    let forwarded = harness.expect_command("Debugger.resume").await;
    assert_eq!(forwarded["params"], json!({"terminateOnResume": false}));
    assert!(proxy.call_stack().is_none());
    harness.reply(&forwarded, json!({}));
    assert_eq!(harness.expect_response(2).await["result"], json!({}));

    // Scopes of the previous pause are gone.
    harness.ide_send(get_properties(3, "dotnet:scope:0"));
    assert!(harness.expect_response(3).await.get("error").is_some());

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn step_into_and_out_arm_stepping_and_resume_once() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);
    ready_with_breakpoint(&mut harness).await;

    for (id, method, kind) in [(2, "Debugger.stepInto", 0), (3, "Debugger.stepOut", 1)] {
        hit_breakpoint(&mut harness).await;

        harness.ide_send(command(id, method, json!({})));
        let arm = harness
            .expect_evaluate(&format!("MONO.mono_wasm_start_single_stepping({kind})"))
            .await;
        harness.reply_value(&arm, json!(true));
        assert_eq!(harness.expect_response(id).await["result"], json!({}));
        let resume = harness.expect_command("Debugger.resume").await;
        harness.reply(&resume, json!({}));
        assert!(proxy.call_stack().is_none());
    }

    // Nothing else was sent: the next runtime command is the IDE's.
    harness.ide_send(command(4, "Page.reload", json!({})));
    harness.expect_command("Page.reload").await;

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn a_repeated_ready_signal_keeps_breakpoints_bound() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    harness.runtime_send(default_context_created(1));
    harness.expect_event("Runtime.executionContextCreated").await;
    let files = harness.expect_evaluate("MONO.mono_wasm_get_loaded_files()").await;
    harness.reply_value(&files, json!([APP_DLL, APP_PDB]));
    let ready_check = harness.expect_evaluate("MONO.mono_wasm_runtime_is_ready").await;

    harness.ide_send(set_breakpoint(10, DOTNET_URL, 10));
    harness.expect_response(10).await;

    // The sentinel pause wins the race against the readiness check.
    harness.runtime_send(paused_in("mono_wasm_runtime_ready"));
    expect_handshake_prefix(&mut harness, 1).await;
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, json!(42));
    let resume = harness.expect_command("Debugger.resume").await;
    harness.reply(&resume, json!({}));
    harness.expect_event("Mono.runtimeReady").await;

    // Late confirmations neither clear nor re-announce anything.
    harness.reply_value(&ready_check, json!(true));
    harness.runtime_send(paused_in("mono_wasm_runtime_ready"));
    let resume = harness.expect_command("Debugger.resume").await;
    harness.reply(&resume, json!({}));

    harness.ide_send(command(11, "Page.reload", json!({})));
    let reload = harness.expect_command("Page.reload").await;
    harness.reply(&reload, json!({}));
    harness.expect_response(11).await;

    let breakpoint = &proxy.breakpoints()[0];
    assert_eq!(breakpoint.state, BreakpointState::Active);
    assert_eq!(breakpoint.remote_id, 42);

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn breakpoints_set_while_ready_are_enabled_immediately() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    // Runtime already running: no sentinel pause, no resume.
    attach(&mut harness, 3, true).await;
    expect_handshake_prefix(&mut harness, 3).await;
    harness.expect_event("Mono.runtimeReady").await;
    assert!(proxy.is_runtime_ready());

    harness.ide_send(set_breakpoint(20, DOTNET_URL, 9));
    let enable = harness.expect_evaluate(&enable_expression(0)).await;
    harness.reply_value(&enable, json!(7));
    let response = harness.expect_response(20).await;
    assert_eq!(response["result"]["breakpointId"], "dotnet:1");
    assert_eq!(response["result"]["locations"][0]["lineNumber"], 9);

    // Evaluation failure is reported verbatim.
    harness.ide_send(set_breakpoint(21, DOTNET_URL, 10));
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    let failure =
        json!({"result": {"type": "object", "subtype": "error", "description": "TypeError: boom"}});
    harness.reply(&enable, failure.clone());
    let response = harness.expect_response(21).await;
    assert_eq!(response["error"], failure);

    // No breakpoint id in the reply.
    harness.ide_send(set_breakpoint(22, DOTNET_URL, 10));
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, Value::Null);
    let response = harness.expect_response(22).await;
    assert_eq!(response["error"]["code"], 100_001);

    assert_eq!(proxy.breakpoints().len(), 1);
    harness.finish().await.unwrap();
}

#[tokio::test]
async fn unresolvable_breakpoints() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);
    attach(&mut harness, 1, false).await;

    // A managed document line without code.
    harness.ide_send(set_breakpoint(30, DOTNET_URL, 99));
    let response = harness.expect_response(30).await;
    assert_eq!(response["error"]["code"], 100_000);
    assert_eq!(
        response["error"]["message"],
        format!("C# Breakpoint at {DOTNET_URL}:99:8 not found.")
    );

    // Script breakpoints go to the runtime untouched.
    harness.ide_send(set_breakpoint(31, "http://app/main.js", 4));
    let forwarded = harness.expect_command("Debugger.setBreakpointByUrl").await;
    assert_eq!(forwarded["params"]["url"], "http://app/main.js");
    harness.reply(&forwarded, json!({"breakpointId": "1:4:8:http://app/main.js", "locations": []}));
    assert_eq!(
        harness.expect_response(31).await["result"]["breakpointId"],
        "1:4:8:http://app/main.js"
    );

    assert!(proxy.breakpoints().is_empty());
    harness.finish().await.unwrap();
}

#[tokio::test]
async fn rejected_breakpoints_are_disabled_until_reattach() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);
    attach(&mut harness, 1, false).await;

    harness.ide_send(set_breakpoint(40, DOTNET_URL, 10));
    harness.expect_response(40).await;

    harness.runtime_send(paused_in("mono_wasm_runtime_ready"));
    expect_handshake_prefix(&mut harness, 1).await;
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, Value::Null);
    let failed = harness.expect_event("Mono.breakpointsFailed").await;
    assert_eq!(failed["params"]["breakpointIds"], json!(["dotnet:1"]));
    let resume = harness.expect_command("Debugger.resume").await;
    harness.reply(&resume, json!({}));
    harness.expect_event("Mono.runtimeReady").await;

    let breakpoint = &proxy.breakpoints()[0];
    assert_eq!(breakpoint.state, BreakpointState::Disabled);
    assert_eq!(breakpoint.remote_id, -1);

    // A new default context resets every breakpoint; symbols stay loaded.
    harness.runtime_send(default_context_created(2));
    harness.expect_event("Runtime.executionContextCreated").await;
    let ready_check = harness.expect_evaluate("MONO.mono_wasm_runtime_is_ready").await;
    assert_eq!(proxy.breakpoints()[0].state, BreakpointState::Pending);
    assert!(!proxy.is_runtime_ready());
    harness.reply_value(&ready_check, json!(true));

    expect_handshake_prefix(&mut harness, 2).await;
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, json!(5));
    harness.expect_event("Mono.runtimeReady").await;
    assert_eq!(proxy.breakpoints()[0].state, BreakpointState::Active);
    assert_eq!(proxy.context().map(|c| c.id), Some(2));

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn removal_is_idempotent() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);
    attach(&mut harness, 1, true).await;
    expect_handshake_prefix(&mut harness, 1).await;
    harness.expect_event("Mono.runtimeReady").await;

    harness.ide_send(set_breakpoint(50, DOTNET_URL, 10));
    let enable = harness.expect_evaluate(&enable_expression(6)).await;
    harness.reply_value(&enable, json!(9));
    harness.expect_response(50).await;

    let remove = remove_breakpoint(51, "dotnet:1");
    harness.ide_send(remove.clone());
    assert_eq!(harness.expect_response(51).await["result"], json!({}));
    let unbind = harness.expect_evaluate("MONO.mono_wasm_remove_breakpoint(9)").await;
    harness.reply_value(&unbind, json!(true));
    assert!(proxy.breakpoints().is_empty());

    // Removing again, or removing garbage, is answered locally and touches nothing.
    harness.ide_send(remove_breakpoint(52, "dotnet:1"));
    assert_eq!(harness.expect_response(52).await["result"], json!({}));
    harness.ide_send(remove_breakpoint(53, "dotnet:nope"));
    assert_eq!(harness.expect_response(53).await["result"], json!({}));

    // Foreign ids belong to the runtime.
    harness.ide_send(remove_breakpoint(54, "1:4:0:http://app/main.js"));
    let forwarded = harness.expect_command("Debugger.removeBreakpoint").await;
    assert_eq!(forwarded["params"]["breakpointId"], "1:4:0:http://app/main.js");

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn pauses_without_a_managed_stack_are_forwarded() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    harness.runtime_send(paused_in("_mono_wasm_fire_bp"));
    let stack = harness.expect_evaluate("MONO.mono_wasm_get_call_stack()").await;
    harness.reply_value(&stack, Value::Null);
    let paused = harness.expect_event("Debugger.paused").await;
    assert_eq!(paused["params"]["callFrames"][0]["functionName"], "_mono_wasm_fire_bp");
    assert!(paused["params"].get("hitBreakpoints").is_none());

    // Same when the introspection call itself fails.
    harness.runtime_send(paused_in("mono_wasm_fire_bp"));
    let stack = harness.expect_evaluate("MONO.mono_wasm_get_call_stack()").await;
    harness.runtime_send(json!({
        "id": stack["id"],
        "error": {"code": -32000, "message": "MONO is not defined"},
    }));
    let paused = harness.expect_event("Debugger.paused").await;
    assert_eq!(paused["params"], paused_in("mono_wasm_fire_bp")["params"]);

    // Ordinary script pauses are not touched at all.
    harness.runtime_send(paused_in("onClick"));
    let paused = harness.expect_event("Debugger.paused").await;
    assert_eq!(paused["params"]["callFrames"].as_array().map(Vec::len), Some(3));
    assert!(proxy.call_stack().is_none());

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn interpreter_scripts_are_hidden() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    for url in ["", "wasm://wasm/00b2", "http://app/main.js"] {
        harness.runtime_send(json!({
            "method": "Debugger.scriptParsed",
            "params": {"scriptId": "12", "url": url},
        }));
    }
    let parsed = harness.expect_event("Debugger.scriptParsed").await;
    assert_eq!(parsed["params"]["url"], "http://app/main.js");

    // Non-default contexts are relayed as they are, without asking the runtime anything.
    harness.runtime_send(json!({
        "method": "Runtime.executionContextCreated",
        "params": {"context": {"id": 9, "auxData": {"isDefault": false}}},
    }));
    harness.expect_event("Runtime.executionContextCreated").await;
    harness.ide_send(json!({"id": 60, "method": "Runtime.enable"}));
    harness.expect_command("Runtime.enable").await;
    assert!(proxy.context().is_none());

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn compile_script_of_managed_expressions_is_acknowledged() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    harness.ide_send(command(
        70,
        "Runtime.compileScript",
        json!({"expression": "//dotnet: x", "sourceURL": "", "persistScript": false}),
    ));
    assert_eq!(harness.expect_response(70).await["result"], json!({}));

    harness.ide_send(command(
        71,
        "Runtime.compileScript",
        json!({"expression": "1 + 1", "sourceURL": "", "persistScript": false}),
    ));
    harness.expect_command("Runtime.compileScript").await;

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn object_and_array_members() {
    let proxy = DebuggerProxy::new(app_loader(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    harness.ide_send(get_properties(80, "dotnet:object:5"));
    let members = harness.expect_evaluate("MONO.mono_wasm_get_object_properties(5)").await;
    harness.reply_value(
        &members,
        json!([
            {"name": "<Name>k__BackingField"},
            {"value": {"type": "string", "value": "Ada"}},
        ]),
    );
    assert_eq!(
        harness.expect_response(80).await["result"]["result"],
        json!([{"name": "Name", "value": {"type": "string", "value": "Ada", "description": "Ada"}}])
    );

    harness.ide_send(get_properties(81, "dotnet:array:6"));
    let values = harness.expect_evaluate("MONO.mono_wasm_get_array_values(6)").await;
    harness.reply_value(&values, json!([{"name": "0"}, {"value": {"type": "number", "value": 1}}]));
    let response = harness.expect_response(81).await;
    assert_eq!(response["result"]["result"][0]["name"], "0");

    // Runtime errors pass through.
    harness.ide_send(get_properties(82, "dotnet:object:99"));
    let members = harness.expect_evaluate("MONO.mono_wasm_get_object_properties(99)").await;
    harness.runtime_send(json!({
        "id": members["id"],
        "error": {"code": -32000, "message": "gone"},
    }));
    assert_eq!(harness.expect_response(82).await["error"]["message"], "gone");

    // Bad ids and stale scopes are answered with errors.
    harness.ide_send(get_properties(83, "dotnet:bogus"));
    assert!(harness.expect_response(83).await.get("error").is_some());
    harness.ide_send(get_properties(84, "dotnet:scope:0"));
    assert!(harness.expect_response(84).await.get("error").is_some());

    // Script objects belong to the runtime.
    harness.ide_send(get_properties(85, r#"{"injectedScriptId":1,"id":2}"#));
    harness.expect_command("Runtime.getProperties").await;

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn script_source_comes_from_disk() {
    let temp = TempDir::new().unwrap();
    let document = temp.path().join("Program.cs");
    std::fs::write(&document, "class Program {}\n").unwrap();
    let document = document.to_string_lossy().into_owned();

    let proxy = DebuggerProxy::with_store(app_loader(&document), store_for(&document));
    let mut harness = Harness::debugger(&proxy);

    harness.ide_send(script_source(90, "dotnet://0_0"));
    assert_eq!(
        harness.expect_response(90).await["result"]["scriptSource"],
        "class Program {}\n"
    );

    harness.ide_send(script_source(91, "dotnet://4_0"));
    assert_eq!(
        harness.expect_response(91).await["result"]["scriptSource"],
        "// Unable to find document dotnet://4_0"
    );

    harness.ide_send(script_source(92, "17"));
    harness.expect_command("Debugger.getScriptSource").await;

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn unreadable_documents_are_explained() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("Gone.cs").to_string_lossy().into_owned();
    let proxy = DebuggerProxy::with_store(app_loader(&missing), store_for(&missing));
    let mut harness = Harness::debugger(&proxy);

    harness.ide_send(script_source(93, "dotnet://0_0"));
    let source = harness.expect_response(93).await["result"]["scriptSource"].clone();
    let source = source.as_str().unwrap();
    assert!(source.starts_with("// Unable to read document ("));
    assert!(source.contains(&format!("Local path: {missing}")));

    harness.finish().await.unwrap();
}

#[tokio::test]
async fn possible_breakpoints_in_a_range() {
    let proxy = DebuggerProxy::with_store(app_loader(DOCUMENT), store_for(DOCUMENT));
    let mut harness = Harness::debugger(&proxy);

    harness.ide_send(json!({
        "id": 100,
        "method": "Debugger.getPossibleBreakpoints",
        "params": {
            "start": {"scriptId": "dotnet://0_0", "lineNumber": 9, "columnNumber": 0},
            "end": {"scriptId": "dotnet://0_0", "lineNumber": 11, "columnNumber": 0},
        },
    }));
    assert_eq!(
        harness.expect_response(100).await["result"]["locations"],
        json!([
            {"scriptId": "dotnet://0_0", "lineNumber": 9, "columnNumber": 8},
            {"scriptId": "dotnet://0_0", "lineNumber": 10, "columnNumber": 8},
        ])
    );

    // Without an end the rest of the document is searched.
    harness.ide_send(json!({
        "id": 101,
        "method": "Debugger.getPossibleBreakpoints",
        "params": {"start": {"scriptId": "dotnet://0_0", "lineNumber": 10, "columnNumber": 0}},
    }));
    let response = harness.expect_response(101).await;
    assert_eq!(response["result"]["locations"].as_array().map(Vec::len), Some(1));

    harness.ide_send(json!({
        "id": 102,
        "method": "Debugger.getPossibleBreakpoints",
        "params": {"start": {"scriptId": "31", "lineNumber": 0}},
    }));
    harness.expect_command("Debugger.getPossibleBreakpoints").await;

    harness.finish().await.unwrap();
}
