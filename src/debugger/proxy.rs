//! Managed debugging on top of the generic relay.
//!
//! [`DebuggerProxy`] holds the per-connection debugging session: symbol store,
//! breakpoint table, current call stack and runtime context. Its handlers claim
//! the handful of protocol methods that need managed semantics; everything else
//! is relayed untouched.

use futures::future;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;

use super::breakpoint::{Breakpoint, BreakpointRequest, BreakpointTable};
use super::commands::{self, StepKind};
use super::frames::{CallStack, ManagedCallStack, translate_call_frames};
use super::ids::{self, ObjectId};
use super::variables::{zip_pairs, zip_scope};
use crate::relay::{
    CdpResult, Connection, Disposition, HandlerFuture, HandlerTable, MessageId, PendingCommand,
    Relay, RelayHandle, SessionId,
};
use crate::symbols::{
    AssemblyLoader, AssemblyResolver, DebugStore, SourceFile, SourceId, SourceLocation,
    SymbolStore, is_dotnet_url, pair_loaded_files,
};

/// The runtime's default execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// `executionContextId` announced documents belong to
    pub id: i64,
    /// The context's `auxData`, echoed in `scriptParsed`
    pub aux_data: Value,
}

#[derive(Default)]
struct Session {
    store: Option<Arc<dyn SymbolStore>>,
    breakpoints: BreakpointTable,
    /// Valid between a translated pause and the next resume or step.
    call_stack: Option<CallStack>,
    runtime_ready: bool,
    context: Option<ExecutionContext>,
}

/// Managed debugging state for one IDE connection.
pub struct DebuggerProxy {
    loader: Arc<AssemblyLoader>,
    session: Mutex<Session>,
    /// Serialises ready handshakes so each pending breakpoint is enabled once.
    handshake: tokio::sync::Mutex<()>,
}

impl DebuggerProxy {
    /// Create a proxy that loads symbols through `loader` when the runtime
    /// reports its loaded files.
    pub fn new(loader: Arc<AssemblyLoader>) -> Arc<Self> {
        Arc::new(Self {
            loader,
            session: Mutex::new(Session::default()),
            handshake: tokio::sync::Mutex::new(()),
        })
    }

    /// Create a proxy with an already loaded symbol store.
    pub fn with_store(loader: Arc<AssemblyLoader>, store: Arc<dyn SymbolStore>) -> Arc<Self> {
        let proxy = Self::new(loader);
        proxy.session.lock().store = Some(store);
        proxy
    }

    /// Handler table claiming the managed-debugging methods.
    pub fn interceptor(self: &Arc<Self>) -> HandlerTable<DebuggerProxy> {
        HandlerTable::new(Arc::clone(self))
            .event("Runtime.executionContextCreated", on_execution_context_created)
            .event("Debugger.paused", on_paused)
            .event("Debugger.scriptParsed", on_script_parsed)
            .command("Debugger.setBreakpointByUrl", on_set_breakpoint_by_url)
            .command("Debugger.removeBreakpoint", on_remove_breakpoint)
            .command("Debugger.resume", on_resume)
            .command("Debugger.stepInto", on_step_into)
            .command("Debugger.stepOver", on_step_over)
            .command("Debugger.stepOut", on_step_out)
            .command("Debugger.getScriptSource", on_get_script_source)
            .command("Debugger.getPossibleBreakpoints", on_get_possible_breakpoints)
            .command("Runtime.getProperties", on_get_properties)
            .command("Runtime.compileScript", on_compile_script)
    }

    /// Relay between `ide` and `runtime` with managed debugging.
    pub fn relay(self: &Arc<Self>, ide: Connection, runtime: Connection) -> Relay {
        Relay::new(ide, runtime, Arc::new(self.interceptor()))
    }

    /// Snapshot of every breakpoint.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.session.lock().breakpoints.iter().cloned().collect()
    }

    /// Whether the ready handshake has run for the current context.
    pub fn is_runtime_ready(&self) -> bool {
        self.session.lock().runtime_ready
    }

    /// Frames of the current pause, if execution is paused in managed code.
    pub fn call_stack(&self) -> Option<CallStack> {
        self.session.lock().call_stack.clone()
    }

    /// The default execution context, once the runtime has created one.
    pub fn context(&self) -> Option<ExecutionContext> {
        self.session.lock().context.clone()
    }

    /// The loaded symbol store, if any.
    pub fn store(&self) -> Option<Arc<dyn SymbolStore>> {
        self.session.lock().store.clone()
    }

    fn using_store<R>(&self, f: impl FnOnce(&dyn SymbolStore) -> R) -> R {
        match self.store() {
            Some(store) => f(store.as_ref()),
            None => f(&DebugStore::default()),
        }
    }

    /// A new default context replaces every runtime binding.
    fn attach(&self, context: ExecutionContext) {
        tracing::info!(context = context.id, "default execution context created");
        let mut session = self.session.lock();
        session.breakpoints.reset_all();
        session.runtime_ready = false;
        session.call_stack = None;
        session.context = Some(context);
    }

    /// Load the symbol store from the runtime's loaded files unless it is
    /// already loaded. Nothing is cached when the file list is unavailable.
    async fn ensure_store(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
    ) -> anyhow::Result<Option<Arc<dyn SymbolStore>>> {
        if let Some(store) = self.store() {
            return Ok(Some(store));
        }

        let reply = evaluate(relay, session, commands::GET_LOADED_FILES).await?;
        let files = match reply
            .evaluated()
            .map(|files| serde_json::from_value::<Vec<String>>(files.clone()))
        {
            Some(Ok(files)) => files,
            _ => {
                tracing::warn!(%reply, "unable to list loaded files");
                return Ok(None);
            }
        };

        let assemblies = self.loader.load(&pair_loaded_files(&files)).await;
        tracing::info!(
            files = files.len(),
            assemblies = assemblies.len(),
            "symbol store loaded"
        );
        let resolver: Arc<dyn AssemblyResolver> = self.loader.clone();
        let store: Arc<dyn SymbolStore> =
            Arc::new(DebugStore::new(assemblies).with_resolver(resolver));
        Ok(Some(Arc::clone(
            self.session.lock().store.get_or_insert(store),
        )))
    }

    /// The runtime is ready: announce documents, rebind pending breakpoints.
    ///
    /// Runs at most once per execution context; returns false when the
    /// handshake had already completed.
    async fn runtime_ready(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
    ) -> anyhow::Result<bool> {
        let _handshake = self.handshake.lock().await;
        if self.is_runtime_ready() {
            tracing::debug!("runtime already ready");
            return Ok(false);
        }

        let store = self.ensure_store(relay, session).await?;
        if let Some(store) = &store {
            let context = self.context();
            let context_id = context.as_ref().map(|c| c.id);
            let aux_data = context.as_ref().map(|c| &c.aux_data);
            for source in store.all_sources() {
                relay.send_event(
                    session,
                    "Debugger.scriptParsed",
                    source.script_parsed(context_id, aux_data),
                );
            }
        }

        let cleared = evaluate(relay, session, commands::CLEAR_ALL_BREAKPOINTS).await?;
        if cleared.is_err() {
            tracing::debug!(%cleared, "failed to clear runtime breakpoints");
        }

        let pending = {
            let mut state = self.session.lock();
            state.runtime_ready = true;
            state.breakpoints.pending()
        };

        let mut failed = Vec::new();
        for (local_id, location) in pending {
            let result = self.enable(relay, session, &location).await?;
            let orphaned = {
                let mut state = self.session.lock();
                match remote_id(&result) {
                    Some(remote) if state.breakpoints.activate(local_id, remote) => {
                        tracing::info!(
                            breakpoint = local_id,
                            remote,
                            %location,
                            "breakpoint active"
                        );
                        None
                    }
                    // Removed while the enable was in flight.
                    Some(remote) => Some(remote),
                    None => {
                        tracing::warn!(
                            breakpoint = local_id,
                            %result,
                            "failed to enable breakpoint"
                        );
                        if state.breakpoints.disable(local_id) {
                            failed.push(ids::breakpoint_id(local_id));
                        }
                        None
                    }
                }
            };
            if let Some(remote) = orphaned {
                self.remove_remote(relay, session, remote).await?;
            }
        }

        if !failed.is_empty() {
            relay.send_event(
                session,
                "Mono.breakpointsFailed",
                json!({ "breakpointIds": failed }),
            );
        }
        Ok(true)
    }

    async fn enable(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
        location: &SourceLocation,
    ) -> anyhow::Result<CdpResult> {
        let Some(il) = &location.il else {
            return Ok(CdpResult::err(
                json!({ "message": format!("{location} is not bound to IL") }),
            ));
        };
        let expression = commands::set_breakpoint(&il.assembly, il.method_token, il.offset);
        Ok(evaluate(relay, session, &expression).await?)
    }

    async fn remove_remote(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
        remote: i64,
    ) -> anyhow::Result<()> {
        let result = evaluate(relay, session, &commands::remove_breakpoint(remote)).await?;
        if result.is_err() {
            tracing::warn!(remote, %result, "runtime failed to remove breakpoint");
        }
        Ok(())
    }

    async fn on_breakpoint_hit(
        &self,
        relay: &RelayHandle,
        session: &SessionId,
        params: &Value,
    ) -> anyhow::Result<Disposition> {
        let reply = evaluate(relay, session, commands::GET_CALL_STACK).await?;
        let Some(managed) = reply.evaluated().and_then(ManagedCallStack::from_value) else {
            tracing::debug!(%reply, "no managed call stack, forwarding pause");
            return Ok(Disposition::Forward);
        };

        let native = params
            .get("callFrames")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let (stack, call_frames) =
            self.using_store(|store| translate_call_frames(native, &managed, store));

        let hit: Vec<String> = {
            let mut state = self.session.lock();
            let hit = state
                .breakpoints
                .by_remote_id(managed.breakpoint_id)
                .map(Breakpoint::id)
                .into_iter()
                .collect();
            state.call_stack = Some(stack);
            hit
        };
        tracing::debug!(
            breakpoint = managed.breakpoint_id,
            ?hit,
            frames = call_frames.len(),
            "breakpoint hit"
        );

        relay.send_event(
            session,
            "Debugger.paused",
            json!({
                "callFrames": call_frames,
                "reason": "other",
                "hitBreakpoints": hit,
            }),
        );
        Ok(Disposition::Handled)
    }
}

fn evaluate(
    relay: &RelayHandle,
    session: impl AsRef<SessionId>,
    expression: &str,
) -> PendingCommand {
    relay.send_command(
        session,
        "Runtime.evaluate",
        commands::evaluate_params(expression),
    )
}

fn remote_id(result: &CdpResult) -> Option<i64> {
    result.evaluated().and_then(Value::as_i64)
}

/// Claimed and already answered.
fn handled() -> Option<HandlerFuture> {
    Some(Box::pin(future::ready(Ok(Disposition::Handled))))
}

/// Claimed; `work` finishes the job.
fn claim<F>(work: F) -> Option<HandlerFuture>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Some(Box::pin(async move {
        work.await?;
        Ok(Disposition::Handled)
    }))
}

fn on_execution_context_created(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    session: &SessionId,
    params: &Value,
) -> Option<HandlerFuture> {
    let context = params.get("context")?;
    let aux_data = context.get("auxData").filter(|aux| aux.is_object())?;
    if aux_data.get("isDefault").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let id = context.get("id").and_then(Value::as_i64)?;

    // The IDE has to see the context before any document announced in it.
    relay.send_event(session, "Runtime.executionContextCreated", params.clone());
    proxy.attach(ExecutionContext {
        id,
        aux_data: aux_data.clone(),
    });

    let (proxy, relay, session) = (Arc::clone(proxy), relay.clone(), session.clone());
    claim(async move {
        proxy.ensure_store(&relay, &session).await?;
        let ready_check = evaluate(&relay, &session, commands::IS_RUNTIME_READY).await?;
        if ready_check.evaluated().and_then(Value::as_bool) == Some(true)
            && proxy.runtime_ready(&relay, &session).await?
        {
            relay.send_event(&session, "Mono.runtimeReady", json!({}));
        }
        Ok(())
    })
}

fn on_paused(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    session: &SessionId,
    params: &Value,
) -> Option<HandlerFuture> {
    let top = params
        .get("callFrames")?
        .get(0)?
        .get("functionName")?
        .as_str()?;
    let breakpoint_hit = commands::is_breakpoint_trampoline(top);
    if !breakpoint_hit && top != commands::READY_SENTINEL {
        return None;
    }

    let (proxy, relay, session) = (Arc::clone(proxy), relay.clone(), session.clone());
    if breakpoint_hit {
        let params = params.clone();
        return Some(Box::pin(async move {
            proxy.on_breakpoint_hit(&relay, &session, &params).await
        }));
    }
    claim(async move {
        let first = proxy.runtime_ready(&relay, &session).await?;
        // The sentinel pause always needs a resume.
        relay
            .send_command(&session, "Debugger.resume", json!({}))
            .await?;
        if first {
            relay.send_event(&session, "Mono.runtimeReady", json!({}));
        }
        Ok(())
    })
}

fn on_script_parsed(
    _proxy: &Arc<DebuggerProxy>,
    _relay: &RelayHandle,
    _session: &SessionId,
    params: &Value,
) -> Option<HandlerFuture> {
    let url = params.get("url").and_then(Value::as_str).unwrap_or_default();
    if url.is_empty() || url.starts_with("wasm://") {
        tracing::trace!(url, "suppressing scriptParsed");
        return handled();
    }
    None
}

fn on_set_breakpoint_by_url(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    params: &Value,
) -> Option<HandlerFuture> {
    let request = BreakpointRequest::from_params(params)?;
    let (known, location) = proxy.using_store(|store| {
        (
            store.file_for_request(&request).is_some(),
            store.find_best_breakpoint(&request),
        )
    });
    // Script breakpoints are the runtime's business.
    if !known && !request.is_dotnet() {
        return None;
    }

    let Some(location) = location else {
        relay.send_response(
            id,
            CdpResult::error_code(
                commands::BREAKPOINT_NOT_FOUND,
                format!("C# Breakpoint at {request} not found."),
            ),
        );
        return handled();
    };

    {
        let mut state = proxy.session.lock();
        if !state.runtime_ready {
            let breakpoint = state.breakpoints.insert_pending(location);
            tracing::info!(
                breakpoint = breakpoint.local_id,
                location = %breakpoint.location,
                "breakpoint pending"
            );
            relay.send_response(id, CdpResult::ok(breakpoint.to_response()));
            return handled();
        }
    }

    let (proxy, relay, id) = (Arc::clone(proxy), relay.clone(), id.clone());
    claim(async move {
        let result = proxy.enable(&relay, &id.session, &location).await?;
        let response = if result.is_err() {
            result
        } else if let Some(remote) = remote_id(&result) {
            let mut state = proxy.session.lock();
            let breakpoint = state.breakpoints.insert_active(location, remote);
            tracing::info!(
                breakpoint = breakpoint.local_id,
                remote,
                location = %breakpoint.location,
                "breakpoint active"
            );
            CdpResult::ok(breakpoint.to_response())
        } else {
            CdpResult::error_code(
                commands::BREAKPOINT_NOT_ENABLED,
                format!("Runtime returned no breakpoint id for {location}"),
            )
        };
        relay.send_response(&id, response);
        Ok(())
    })
}

fn on_remove_breakpoint(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    params: &Value,
) -> Option<HandlerFuture> {
    let breakpoint_id = params.get("breakpointId")?.as_str()?;
    let local = ids::parse_breakpoint_id(breakpoint_id)?;
    let removed = local.and_then(|local| proxy.session.lock().breakpoints.remove(local));

    // Local removal is authoritative.
    relay.send_response(id, CdpResult::empty());

    match removed {
        Some((breakpoint, Some(remote))) => {
            tracing::info!(breakpoint = breakpoint.local_id, remote, "breakpoint removed");
            let (proxy, relay, session) = (Arc::clone(proxy), relay.clone(), id.session.clone());
            claim(async move { proxy.remove_remote(&relay, &session, remote).await })
        }
        Some((breakpoint, None)) => {
            tracing::info!(breakpoint = breakpoint.local_id, "unbound breakpoint removed");
            handled()
        }
        None => {
            tracing::debug!(breakpoint_id, "no such breakpoint");
            handled()
        }
    }
}

fn on_resume(
    proxy: &Arc<DebuggerProxy>,
    _relay: &RelayHandle,
    _id: &MessageId,
    _params: &Value,
) -> Option<HandlerFuture> {
    proxy.session.lock().call_stack = None;
    None
}

fn step(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    kind: StepKind,
) -> Option<HandlerFuture> {
    if proxy.session.lock().call_stack.is_none() {
        return None;
    }

    let (proxy, relay, id) = (Arc::clone(proxy), relay.clone(), id.clone());
    claim(async move {
        let armed = evaluate(&relay, &id, &commands::start_single_stepping(kind)).await?;
        if armed.is_err() {
            tracing::warn!(?kind, %armed, "failed to arm single stepping");
        }
        relay.send_response(&id, CdpResult::empty());
        proxy.session.lock().call_stack = None;
        relay.send_command(&id, "Debugger.resume", json!({})).await?;
        Ok(())
    })
}

fn on_step_into(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    _params: &Value,
) -> Option<HandlerFuture> {
    step(proxy, relay, id, StepKind::Into)
}

fn on_step_over(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    _params: &Value,
) -> Option<HandlerFuture> {
    step(proxy, relay, id, StepKind::Over)
}

fn on_step_out(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    _params: &Value,
) -> Option<HandlerFuture> {
    step(proxy, relay, id, StepKind::Out)
}

fn on_get_script_source(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    params: &Value,
) -> Option<HandlerFuture> {
    let script_id = params.get("scriptId")?.as_str()?;
    if !is_dotnet_url(script_id) {
        return None;
    }
    let file = SourceId::parse(script_id)
        .and_then(|source| proxy.store()?.file_by_id(&source).cloned());

    let (relay, id, script_id) = (relay.clone(), id.clone(), script_id.to_owned());
    claim(async move {
        let source = match file {
            Some(file) => read_document(&file).await,
            None => format!("// Unable to find document {script_id}"),
        };
        relay.send_response(&id, CdpResult::ok(json!({ "scriptSource": source })));
        Ok(())
    })
}

async fn read_document(file: &SourceFile) -> String {
    let Some(path) = file.local_path() else {
        return format!("// Unable to find document {}", file.url);
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(source) => source,
        Err(err) => format!(
            "// Unable to read document ({err})\nLocal path: {}\n",
            path.display()
        ),
    }
}

fn on_get_possible_breakpoints(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    params: &Value,
) -> Option<HandlerFuture> {
    let start = SourceLocation::from_json(params.get("start")?)?;
    let end = match params.get("end") {
        Some(end) => SourceLocation::from_json(end)?,
        None => SourceLocation::new(start.id, u32::MAX, u32::MAX),
    };
    let locations = proxy.store()?.find_possible_breakpoints(&start, &end)?;
    let locations: Vec<Value> = locations.iter().map(SourceLocation::to_json).collect();
    relay.send_response(id, CdpResult::ok(json!({ "locations": locations })));
    handled()
}

fn on_get_properties(
    proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    params: &Value,
) -> Option<HandlerFuture> {
    let object_id = params.get("objectId")?.as_str()?;
    if !ids::is_namespaced(object_id) {
        return None;
    }
    let Some(target) = ObjectId::parse(object_id) else {
        relay.send_response(
            id,
            CdpResult::err(json!({ "message": format!("Invalid object id {object_id}") })),
        );
        return handled();
    };

    let pending = match target {
        ObjectId::Scope(frame_id) => {
            let frame = proxy
                .session
                .lock()
                .call_stack
                .as_ref()
                .and_then(|stack| stack.get(frame_id).cloned());
            let Some(frame) = frame else {
                relay.send_response(
                    id,
                    CdpResult::err(json!({
                        "message": format!("No frame {frame_id} in the current call stack")
                    })),
                );
                return handled();
            };
            let vars = frame.method.live_vars_at(frame.il_offset());
            let slots: Vec<i32> = vars.iter().map(|var| var.index).collect();
            let pending = evaluate(relay, id, &commands::get_variables(frame.id, &slots));
            let (relay, id) = (relay.clone(), id.clone());
            return claim(async move {
                let reply = pending.await?;
                relay.send_response(
                    &id,
                    properties_reply(reply, |values| zip_scope(&vars, values)),
                );
                Ok(())
            });
        }
        ObjectId::Object(handle) => (
            evaluate(relay, id, &commands::get_object_properties(handle)),
            true,
        ),
        ObjectId::Array(handle) => (
            evaluate(relay, id, &commands::get_array_values(handle)),
            false,
        ),
    };

    let (pending, clean_names) = pending;
    let (relay, id) = (relay.clone(), id.clone());
    claim(async move {
        let reply = pending.await?;
        relay.send_response(
            &id,
            properties_reply(reply, |values| zip_pairs(values, clean_names)),
        );
        Ok(())
    })
}

/// Runtime errors pass through unchanged; values are zipped into properties.
fn properties_reply(reply: CdpResult, zip: impl FnOnce(&[Value]) -> Vec<Value>) -> CdpResult {
    if reply.is_err() {
        return reply;
    }
    let values = reply
        .evaluated()
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    CdpResult::ok(json!({ "result": zip(values) }))
}

fn on_compile_script(
    _proxy: &Arc<DebuggerProxy>,
    relay: &RelayHandle,
    id: &MessageId,
    params: &Value,
) -> Option<HandlerFuture> {
    let expression = params.get("expression")?.as_str()?;
    if !expression.starts_with("//dotnet:") {
        return None;
    }
    relay.send_response(id, CdpResult::empty());
    handled()
}
