//! Scripted IDE and runtime peers for relay tests.

#![allow(dead_code)]

use devtools_bridge::debugger::DebuggerProxy;
use devtools_bridge::relay::{
    Connection, MemoryEndpoint, Relay, RelayHandle, RelayResult, ShutdownReason, memory_pair,
};
use devtools_bridge::symbols::{AssemblyLoader, ManifestReader, MemorySource};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const APP_DLL: &str = "http://app/_framework/App.dll";
pub const APP_PDB: &str = "http://app/_framework/App.pdb";
pub const MAIN_TOKEN: u32 = 0x0600_0001;

/// Symbol manifest of a one-method assembly whose only document is `document`.
///
/// `Main(string[] args)` has sequence points on lines 10 and 11 (1-based) and
/// one local, `count`.
pub fn app_manifest(document: &str) -> Value {
    json!({
        "name": "App",
        "documents": [{"name": document}],
        "methods": [{
            "token": MAIN_TOKEN,
            "name": "Main",
            "document": 0,
            "sequence_points": [
                {"offset": 0, "start_line": 10, "start_column": 9,
                 "end_line": 10, "end_column": 30},
                {"offset": 6, "start_line": 11, "start_column": 9,
                 "end_line": 11, "end_column": 25},
            ],
            "parameters": ["args"],
            "scopes": [{
                "start_offset": 0,
                "end_offset": 20,
                "locals": [{"name": "count", "index": 0}],
            }],
        }],
    })
}

pub fn app_loader(document: &str) -> Arc<AssemblyLoader> {
    let source = MemorySource::new()
        .with_file(APP_DLL, b"MZ".to_vec())
        .with_file(APP_PDB, app_manifest(document).to_string());
    Arc::new(AssemblyLoader::new(Arc::new(source), Arc::new(ManifestReader)))
}

/// A running relay with both peers scripted by the test.
pub struct Harness {
    pub ide: MemoryEndpoint,
    pub runtime: MemoryEndpoint,
    pub handle: RelayHandle,
    pub task: JoinHandle<RelayResult<ShutdownReason>>,
}

impl Harness {
    pub fn start(build: impl FnOnce(Connection, Connection) -> Relay) -> Self {
        let (ide, ide_side) = memory_pair();
        let (runtime_side, runtime) = memory_pair();
        let relay = build(ide_side.into_connection(), runtime_side.into_connection());
        let handle = relay.handle();
        let task = tokio::spawn(relay.run());
        Self {
            ide,
            runtime,
            handle,
            task,
        }
    }

    pub fn passthrough() -> Self {
        Self::start(Relay::passthrough)
    }

    pub fn debugger(proxy: &Arc<DebuggerProxy>) -> Self {
        Self::start(|ide, runtime| proxy.relay(ide, runtime))
    }

    pub async fn ide_recv(&mut self) -> Value {
        recv(&mut self.ide).await
    }

    pub async fn runtime_recv(&mut self) -> Value {
        recv(&mut self.runtime).await
    }

    pub fn ide_send(&self, message: Value) {
        self.ide.send_json(&message).unwrap();
    }

    pub fn runtime_send(&self, message: Value) {
        self.runtime.send_json(&message).unwrap();
    }

    /// Next command at the runtime; asserts its method.
    pub async fn expect_command(&mut self, method: &str) -> Value {
        let command = self.runtime_recv().await;
        assert_eq!(command["method"], method, "unexpected command {command}");
        command
    }

    /// Next `Runtime.evaluate` at the runtime; asserts its expression.
    pub async fn expect_evaluate(&mut self, expression: &str) -> Value {
        let command = self.expect_command("Runtime.evaluate").await;
        assert_eq!(command["params"]["expression"], expression);
        command
    }

    /// Answer `command` with `result`.
    pub fn reply(&self, command: &Value, result: Value) {
        self.runtime_send(json!({"id": command["id"], "result": result}));
    }

    /// Answer a `Runtime.evaluate` with a by-value result.
    pub fn reply_value(&self, command: &Value, value: Value) {
        self.reply(command, json!({"result": {"type": "object", "value": value}}));
    }

    /// Next IDE-bound message; asserts it is the event `method`.
    pub async fn expect_event(&mut self, method: &str) -> Value {
        let event = self.ide_recv().await;
        assert_eq!(event["method"], method, "unexpected message {event}");
        event
    }

    /// Next IDE-bound message; asserts it answers `id`.
    pub async fn expect_response(&mut self, id: i64) -> Value {
        let response = self.ide_recv().await;
        assert_eq!(response["id"], id, "unexpected message {response}");
        response
    }

    pub async fn finish(self) -> RelayResult<ShutdownReason> {
        let Harness {
            ide,
            runtime,
            handle: _,
            task,
        } = self;
        drop(ide);
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("relay did not stop")
            .expect("relay task panicked");
        drop(runtime);
        result
    }
}

pub async fn recv(endpoint: &mut MemoryEndpoint) -> Value {
    tokio::time::timeout(Duration::from_secs(5), endpoint.recv_json())
        .await
        .expect("timed out waiting for a message")
        .expect("peer closed")
}

/// IDE command envelope.
pub fn command(id: i64, method: &str, params: Value) -> Value {
    json!({"id": id, "method": method, "params": params})
}

/// Runtime pause whose top frame is `function_name`.
pub fn paused_in(function_name: &str) -> Value {
    json!({
        "method": "Debugger.paused",
        "params": {
            "reason": "other",
            "callFrames": [
                {"functionName": function_name, "url": "http://app/_framework/dotnet.js",
                 "callFrameId": "native:0"},
                {"functionName": "wasm-function[812]", "url": "wasm://wasm/00b2",
                 "callFrameId": "native:1"},
                {"functionName": "onClick", "url": "http://app/main.js", "callFrameId": "native:2"},
            ],
        },
    })
}

pub fn default_context_created(id: i64) -> Value {
    json!({
        "method": "Runtime.executionContextCreated",
        "params": {"context": {
            "id": id,
            "origin": "http://app",
            "auxData": {"isDefault": true, "frameId": "F1"},
        }},
    })
}
