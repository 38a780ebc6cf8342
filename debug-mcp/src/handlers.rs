// MCP request handlers
//
// Handles initialize, list tools, and debug tool execution

use crate::protocol::*;
use crate::session::{DebugSession, SessionManager};
use crate::tools;
use script_debugger::{
    BreakpointSpec, DebugEvent, DebuggerConfig, RunOutcome, StackFrameSnapshot,
    Value as ScriptValue,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DEFAULT_EVENT_TIMEOUT_MS: u64 = 5000;

pub struct RequestHandler {
    session_manager: SessionManager,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self {
            session_manager: SessionManager::new(),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                debug!("Request cancelled");
            }
            _ => {
                warn!("Unknown notification: {}", notification.method);
            }
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid initialize params: {}", e))
            })?;
        if let Some(client) = &params.client_info {
            info!("Initializing for {}", client.name);
        }

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "debug-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Script debugging server. \
                Set breakpoints with debug.set_breakpoint, start a run with debug.launch, \
                then use debug.wait_for_event, debug.get_stack and the step tools."
                    .to_string(),
            ),
        };

        to_json(result)
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        to_json(ListToolsResult {
            tools: tools::get_tools(),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid tool call params: {}", e))
            })?;
        let args = call_params.arguments;

        // Route to appropriate handler based on tool name
        let result = match call_params.name.as_str() {
            "debug.launch" => self.handle_launch(args).await,
            "debug.set_breakpoint" => self.handle_set_breakpoint(args).await,
            "debug.clear_breakpoint" => self.handle_clear_breakpoint(args).await,
            "debug.list_breakpoints" => self.handle_list_breakpoints(args).await,
            "debug.continue" => self.handle_continue(args).await,
            "debug.step_over" => self.handle_step_over(args).await,
            "debug.step_into" => self.handle_step_into(args).await,
            "debug.step_out" => self.handle_step_out(args).await,
            "debug.terminate" => self.handle_terminate(args).await,
            "debug.get_stack" => self.handle_get_stack(args).await,
            "debug.get_variable" => self.handle_get_variable(args).await,
            "debug.list_variables" => self.handle_list_variables(args).await,
            "debug.set_variable" => self.handle_set_variable(args).await,
            "debug.wait_for_event" => self.handle_wait_for_event(args).await,
            "debug.status" => self.handle_status(args).await,
            _ => Err(format!("Unknown tool: {}", call_params.name)),
        };

        let call_result = match result {
            Ok(content) => CallToolResult {
                content: vec![ContentBlock::Text { text: content }],
                is_error: None,
            },
            Err(error) => {
                debug!("Tool {} failed: {}", call_params.name, error);
                CallToolResult {
                    content: vec![ContentBlock::Text { text: error }],
                    is_error: Some(true),
                }
            }
        };
        to_json(call_result)
    }

    async fn current(&self) -> Result<Arc<Mutex<DebugSession>>, String> {
        self.session_manager
            .get_current_session()
            .await
            .ok_or_else(|| "No active debug session. Use debug.launch first.".to_string())
    }

    async fn handle_launch(&self, args: Value) -> Result<String, String> {
        let script = path_arg(&args, "script")?;

        if let Some(existing) = self.session_manager.get_current_session().await {
            let existing = existing.lock().await;
            if !existing.is_finished() {
                return Err(format!(
                    "Session {} is still running. Use debug.terminate first.",
                    existing.id
                ));
            }
        }

        let config = DebuggerConfig::new()
            .suspend_on_startup(bool_arg(&args, "stop_on_entry"))
            .suspend_on_script_load(bool_arg(&args, "stop_on_script_load"))
            .suspend_timeout(
                args.get("suspend_timeout_ms")
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_millis),
            );

        let session_id = self
            .session_manager
            .create_session(script.clone(), config)
            .await
            .map_err(|e| format!("Failed to launch: {}", e))?;

        Ok(format!(
            "🚀 Launched {} (session: {})\n   Use debug.wait_for_event to follow execution",
            script.display(),
            session_id
        ))
    }

    async fn handle_set_breakpoint(&self, args: Value) -> Result<String, String> {
        let file = path_arg(&args, "file")?;
        let line = line_arg(&args)?;

        let mut spec = BreakpointSpec::new(file, line);
        if let Some(condition) = args.get("condition").and_then(|v| v.as_str()) {
            spec = spec.with_condition(condition);
        }
        if bool_arg(&args, "temporary") {
            spec = spec.temporary();
        }
        if let Some(hit_count) = args.get("hit_count").and_then(|v| v.as_u64()) {
            let hit_count =
                u32::try_from(hit_count).map_err(|_| "'hit_count' is too large".to_string())?;
            spec = spec.with_hit_count(hit_count);
        }

        let replaced = self.session_manager.breakpoints().insert(spec.clone());

        // Also arm the running session, its file may already be loaded
        if let Some(session) = self.session_manager.get_current_session().await {
            let session = session.lock().await;
            if session.debugger.is_running() {
                session
                    .debugger
                    .set_breakpoint(spec.clone())
                    .map_err(|e| format!("Failed to set breakpoint: {}", e))?;
            }
        }

        let mut output = format!(
            "✅ Breakpoint {} at {}:{}",
            if replaced { "replaced" } else { "set" },
            spec.file.display(),
            spec.line
        );
        output.push_str(&describe_options(&spec));
        Ok(output)
    }

    async fn handle_clear_breakpoint(&self, args: Value) -> Result<String, String> {
        let file = path_arg(&args, "file")?;
        let line = line_arg(&args)?;

        let mut removed = self.session_manager.breakpoints().remove(&file, line).is_some();
        if let Some(session) = self.session_manager.get_current_session().await {
            let session = session.lock().await;
            removed |= session
                .debugger
                .clear_breakpoint(&file, line)
                .map_err(|e| format!("Failed to clear breakpoint: {}", e))?
                .is_some();
        }

        if !removed {
            return Err(format!("No breakpoint at {}:{}", file.display(), line));
        }
        Ok(format!("✅ Breakpoint cleared at {}:{}", file.display(), line))
    }

    async fn handle_list_breakpoints(&self, _args: Value) -> Result<String, String> {
        let specs = self.session_manager.breakpoints().list();
        if specs.is_empty() {
            return Ok("No breakpoints set".to_string());
        }

        let mut output = format!("📍 {} breakpoint(s):\n\n", specs.len());
        for spec in &specs {
            output.push_str(&format!("  {}:{}", spec.file.display(), spec.line));
            output.push_str(&describe_options(spec));
            output.push('\n');
        }
        Ok(output)
    }

    async fn handle_continue(&self, _args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let session = session.lock().await;
        session
            .debugger
            .step_continue()
            .map_err(|e| format!("Failed to resume: {}", e))?;
        Ok("▶️  Execution resumed".to_string())
    }

    async fn handle_step_over(&self, _args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let session = session.lock().await;
        session
            .debugger
            .step_over()
            .map_err(|e| format!("Failed to step over: {}", e))?;
        Ok("⏭️  Stepping over".to_string())
    }

    async fn handle_step_into(&self, _args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let session = session.lock().await;
        session
            .debugger
            .step_into()
            .map_err(|e| format!("Failed to step into: {}", e))?;
        Ok("⬇️  Stepping into".to_string())
    }

    async fn handle_step_out(&self, _args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let session = session.lock().await;
        session
            .debugger
            .step_out()
            .map_err(|e| format!("Failed to step out: {}", e))?;
        Ok("⬆️  Stepping out".to_string())
    }

    async fn handle_terminate(&self, _args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let mut session = session.lock().await;

        if session.debugger.is_running() {
            session
                .debugger
                .quit()
                .map_err(|e| format!("Cannot terminate: {}", e))?;
        }
        let result = session.join().await;
        let session_id = session.id.clone();
        drop(session);
        self.session_manager.remove_session(&session_id).await;

        Ok(match result {
            Some(Ok(outcome)) => format!(
                "⏹️  Session {} ended: {}",
                session_id,
                describe_outcome(&outcome)
            ),
            Some(Err(e)) => format!("⏹️  Session {} ended with error: {}", session_id, e),
            None => format!("⏹️  Session {} closed", session_id),
        })
    }

    async fn handle_get_stack(&self, args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let session = session.lock().await;

        let max_frames = args
            .get("max_frames")
            .and_then(|v| v.as_u64())
            .unwrap_or(20) as usize;
        let include_variables = args
            .get("include_variables")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let stack = session
            .debugger
            .current_stack()
            .map_err(|e| format!("Failed to get stack: {}", e))?
            .ok_or_else(|| "Execution is not suspended".to_string())?;

        Ok(format_stack(&stack, max_frames, include_variables))
    }

    async fn handle_get_variable(&self, args: Value) -> Result<String, String> {
        let name = str_arg(&args, "name")?;
        let session = self.current().await?;
        let session = session.lock().await;

        match session
            .debugger
            .get_variable(name)
            .map_err(|e| format!("Failed to read {}: {}", name, e))?
        {
            Some(value) => Ok(format!("{} = {}", name, value.format())),
            None => Err(format!("Variable not found: {}", name)),
        }
    }

    async fn handle_list_variables(&self, _args: Value) -> Result<String, String> {
        let session = self.current().await?;
        let session = session.lock().await;

        let locals = session
            .debugger
            .list_variables()
            .map_err(|e| format!("Failed to list variables: {}", e))?
            .ok_or_else(|| "No frame available".to_string())?;

        if locals.is_empty() {
            return Ok("No local variables".to_string());
        }
        let mut output = format!("{} local(s):\n", locals.len());
        for (name, value) in &locals {
            output.push_str(&format!("  {} = {}\n", name, value.format()));
        }
        Ok(output)
    }

    async fn handle_set_variable(&self, args: Value) -> Result<String, String> {
        let name = str_arg(&args, "name")?;
        let raw = args
            .get("value")
            .cloned()
            .ok_or_else(|| "Missing 'value' parameter".to_string())?;
        let value: ScriptValue =
            serde_json::from_value(raw).map_err(|e| format!("Invalid value: {}", e))?;

        let session = self.current().await?;
        let session = session.lock().await;
        let rendered = value.format();
        let written = session
            .debugger
            .set_variable(name, value)
            .map_err(|e| format!("Failed to set {}: {}", name, e))?;
        if !written {
            return Err("No frame available".to_string());
        }
        Ok(format!("✅ {} = {}", name, rendered))
    }

    async fn handle_wait_for_event(&self, args: Value) -> Result<String, String> {
        let timeout_ms = args
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_EVENT_TIMEOUT_MS);

        let session = self.current().await?;
        // Don't hold the session while waiting
        let events = session.lock().await.events.clone();
        let Some(event) = events
            .recv_event_timeout(Duration::from_millis(timeout_ms))
            .await
        else {
            return Ok(format!("No event within {}ms", timeout_ms));
        };

        let mut session = session.lock().await;
        session.observe(&event);
        let mut output = describe_event(&event);

        if let DebugEvent::Terminated { .. } = event {
            if let Some(Err(e)) = session.join().await {
                output.push_str(&format!("\n   Error: {}", e));
            }
        }
        Ok(output)
    }

    async fn handle_status(&self, _args: Value) -> Result<String, String> {
        let breakpoints = self.session_manager.breakpoints().list().len();
        let Some(session) = self.session_manager.get_current_session().await else {
            return Ok(format!(
                "No active session\n   Breakpoints: {}",
                breakpoints
            ));
        };
        let session = session.lock().await;

        let state = if session.debugger.is_suspended() {
            "suspended"
        } else if session.is_finished() {
            "finished"
        } else {
            "running"
        };

        let mut output = format!(
            "Session {}\n   Script: {}\n   State: {}\n   Breakpoints: {}",
            session.id,
            session.script.display(),
            state,
            breakpoints
        );
        if let Some(event) = &session.last_event {
            output.push_str(&format!("\n   Last event: {}", describe_event(event)));
        }
        if let Some(outcome) = &session.outcome {
            output.push_str(&format!("\n   Outcome: {}", describe_outcome(outcome)));
        }
        Ok(output)
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing '{}' parameter", key))
}

fn bool_arg(args: &Value, key: &str) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Canonical when the file exists, so breakpoints match executing frames.
fn path_arg(args: &Value, key: &str) -> Result<PathBuf, String> {
    let raw = str_arg(args, key)?;
    if raw.is_empty() {
        return Err(format!("'{}' must not be empty", key));
    }
    let path = PathBuf::from(raw);
    Ok(std::fs::canonicalize(&path).unwrap_or(path))
}

fn line_arg(args: &Value) -> Result<u32, String> {
    let line = args
        .get("line")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| "Missing 'line' parameter".to_string())?;
    match u32::try_from(line) {
        Ok(line) if line >= 1 => Ok(line),
        _ => Err(format!("Invalid line number: {}", line)),
    }
}

fn describe_options(spec: &BreakpointSpec) -> String {
    let mut options = Vec::new();
    if let Some(condition) = &spec.condition {
        options.push(format!("if {}", condition));
    }
    if spec.temporary {
        options.push("temporary".to_string());
    }
    if spec.hit_count > 0 {
        options.push(format!("ignore {} hit(s)", spec.hit_count));
    }
    if options.is_empty() {
        String::new()
    } else {
        format!(" [{}]", options.join(", "))
    }
}

fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Aborted => "aborted".to_string(),
        RunOutcome::Failed { message } => format!("failed: {}", message),
    }
}

fn describe_event(event: &DebugEvent) -> String {
    match event {
        DebugEvent::Started { thread } => format!("▶️  Started on thread {}", thread),
        DebugEvent::Suspended { thread, stack } => match stack.first() {
            Some(top) => format!(
                "⏸️  Suspended on thread {} at {}:{} in {}",
                thread,
                top.file.display(),
                top.line,
                top.function
            ),
            None => format!("⏸️  Suspended on thread {}", thread),
        },
        DebugEvent::Resumed { thread, reason } => {
            format!("▶️  Resumed thread {} ({})", thread, reason)
        }
        DebugEvent::Terminated { thread, outcome } => format!(
            "⏹️  Thread {} terminated: {}",
            thread,
            describe_outcome(outcome)
        ),
    }
}

fn format_stack(stack: &StackFrameSnapshot, max_frames: usize, include_variables: bool) -> String {
    if stack.is_empty() {
        return "No script frames on the stack".to_string();
    }

    let mut output = format!("🔍 Stack ({} frames):\n\n", stack.len());
    for (idx, frame) in stack.iter().take(max_frames).enumerate() {
        output.push_str(&format!(
            "Frame {}: {} at {}:{}\n",
            idx,
            frame.function,
            frame.file.display(),
            frame.line
        ));
        if include_variables && !frame.locals.is_empty() {
            output.push_str(&format!("  Variables ({}):\n", frame.locals.len()));
            for (name, value) in &frame.locals {
                output.push_str(&format!("    {} = {}\n", name, value.format()));
            }
        }
    }
    if stack.len() > max_frames {
        output.push_str(&format!("... {} more frame(s)\n", stack.len() - max_frames));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(handler: &RequestHandler, name: &str, arguments: Value) -> (String, bool) {
        let request: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }))
        .unwrap();
        let response = handler.handle_request(request).await;
        let result = response.result.expect("tool calls always succeed at the RPC level");
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
        (text, is_error)
    }

    async fn wait_until(handler: &RequestHandler, marker: &str) -> String {
        for _ in 0..20 {
            let (text, is_error) =
                call(handler, "debug.wait_for_event", json!({"timeout_ms": 2000})).await;
            assert!(!is_error, "{}", text);
            if text.contains(marker) {
                return text;
            }
        }
        panic!("never saw {}", marker);
    }

    fn write_script(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("main.json");
        let program = json!({
            "globals": { "limit": 3 },
            "body": [
                { "line": 1, "set": "x", "value": 1 },
                { "line": 2, "call": "bump" },
                { "line": 3, "set": "seen", "from": "limit" },
                { "line": 4 }
            ],
            "functions": {
                "bump": { "body": [ { "line": 7, "set": "y", "value": 2 }, { "line": 8 } ] }
            }
        });
        std::fs::write(&path, program.to_string()).unwrap();
        std::fs::canonicalize(path).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let handler = RequestHandler::new();
        let request: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": { "protocolVersion": "2024-11-05", "clientInfo": { "name": "test" } }
        }))
        .unwrap();
        let response = handler.handle_request(request).await;
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], "debug-mcp");

        let request: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
                .unwrap();
        let response = handler.handle_request(request).await;
        assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = RequestHandler::new();
        let request: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3, "method": "bogus"}))
                .unwrap();
        let response = handler.handle_request(request).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_step_without_session_is_a_tool_error() {
        let handler = RequestHandler::new();
        let (text, is_error) = call(&handler, "debug.step_over", json!({})).await;
        assert!(is_error);
        assert!(text.contains("debug.launch"));
    }

    #[tokio::test]
    async fn test_breakpoint_session_flow() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path());
        let script_arg = script.to_string_lossy().to_string();
        let handler = RequestHandler::new();

        // Set before launch, installed when the file is entered
        let (text, is_error) = call(
            &handler,
            "debug.set_breakpoint",
            json!({"file": script_arg, "line": 8}),
        )
        .await;
        assert!(!is_error, "{}", text);

        let (text, is_error) = call(&handler, "debug.launch", json!({"script": script_arg})).await;
        assert!(!is_error, "{}", text);

        let text = wait_until(&handler, "Suspended").await;
        assert!(text.contains(":8 in bump"), "{}", text);

        let (text, _) = call(&handler, "debug.get_variable", json!({"name": "y"})).await;
        assert_eq!(text, "y = 2");

        let (text, is_error) = call(
            &handler,
            "debug.set_variable",
            json!({"name": "limit", "value": 9}),
        )
        .await;
        assert!(!is_error, "{}", text);

        let (text, _) = call(&handler, "debug.get_stack", json!({})).await;
        assert!(text.contains("Frame 1: <module>"), "{}", text);

        let (_, is_error) = call(&handler, "debug.step_out", json!({})).await;
        assert!(!is_error);
        wait_until(&handler, "Suspended").await;

        let (_, is_error) = call(&handler, "debug.step_over", json!({})).await;
        assert!(!is_error);
        wait_until(&handler, "Suspended").await;
        let (text, _) = call(&handler, "debug.get_variable", json!({"name": "seen"})).await;
        assert_eq!(text, "seen = 9");

        let (_, is_error) = call(&handler, "debug.continue", json!({})).await;
        assert!(!is_error);
        let text = wait_until(&handler, "terminated").await;
        assert!(text.contains("completed"), "{}", text);

        let (text, _) = call(&handler, "debug.status", json!({})).await;
        assert!(text.contains("State: finished"), "{}", text);
    }

    #[tokio::test]
    async fn test_terminate_suspended_run() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path());
        let handler = RequestHandler::new();

        let (text, is_error) = call(
            &handler,
            "debug.launch",
            json!({"script": script.to_string_lossy(), "stop_on_entry": true}),
        )
        .await;
        assert!(!is_error, "{}", text);
        wait_until(&handler, "Suspended").await;

        let (text, is_error) = call(&handler, "debug.launch", json!({"script": script.to_string_lossy()})).await;
        assert!(is_error);
        assert!(text.contains("still running"));

        let (text, is_error) = call(&handler, "debug.terminate", json!({})).await;
        assert!(!is_error, "{}", text);
        assert!(text.contains("aborted"), "{}", text);

        let (text, _) = call(&handler, "debug.status", json!({})).await;
        assert!(text.starts_with("No active session"));
    }

    #[tokio::test]
    async fn test_clear_unknown_breakpoint() {
        let handler = RequestHandler::new();
        let (text, is_error) = call(
            &handler,
            "debug.clear_breakpoint",
            json!({"file": "/tmp/none.json", "line": 3}),
        )
        .await;
        assert!(is_error);
        assert!(text.contains("No breakpoint"));

        let (_, is_error) = call(
            &handler,
            "debug.set_breakpoint",
            json!({"file": "/tmp/none.json", "line": 0}),
        )
        .await;
        assert!(is_error);
    }
}
