// Reference host runtime
//
// Executes structured JSON programs line by line so the engine can be driven
// without embedding a real interpreter. Used by tests, demos and the MCP
// server.
//
// Program layout:
//
//   { "globals": { "limit": 3 },
//     "body": [ { "line": 1, "set": "x", "value": 1 },
//               { "line": 2, "call": "helper" } ],
//     "functions": { "helper": { "file": "lib.json",
//                                "body": [ { "line": 4, "global": "g", "value": 2 } ] } } }
//
// Statements: `set` (local, from `value` or from another variable via
// `from`), `global`, `call`, `fail`, and bare `{ "line": n }` as a no-op.

use crate::error::{DebugError, DebugResult, ScriptError};
use crate::frame::{FrameRef, HostFrame};
use crate::host::{ScriptHost, TraceHook};
use crate::types::{FrameId, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// File name of the synthetic outermost frame. Never exists on disk.
pub const ENTRY_FILE: &str = "<string>";

const MAX_CALL_DEPTH: usize = 200;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

pub type Scope = Arc<Mutex<BTreeMap<String, Value>>>;

#[derive(Debug, Clone, Deserialize)]
pub struct SimProgram {
    #[serde(default)]
    pub globals: BTreeMap<String, Value>,
    #[serde(default)]
    pub body: Vec<Statement>,
    #[serde(default)]
    pub functions: BTreeMap<String, SimFunction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimFunction {
    /// Source file, relative to the program's directory. Defaults to the program itself.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum Statement {
    Set { line: u32, set: String, value: Value },
    Copy { line: u32, set: String, from: String },
    Global { line: u32, global: String, value: Value },
    Call { line: u32, call: String },
    Fail { line: u32, fail: String },
    Pass { line: u32 },
}

impl Statement {
    pub fn line(&self) -> u32 {
        match self {
            Statement::Set { line, .. }
            | Statement::Copy { line, .. }
            | Statement::Global { line, .. }
            | Statement::Call { line, .. }
            | Statement::Fail { line, .. }
            | Statement::Pass { line } => *line,
        }
    }
}

impl SimProgram {
    pub fn load(path: &Path) -> DebugResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            ScriptError::new(format!("invalid program: {}", e))
                .at(path, e.line() as u32)
                .into()
        })
    }
}

/// Frame of a running `SimProgram`.
#[derive(Debug)]
pub struct SimFrame {
    id: FrameId,
    file: PathBuf,
    function: String,
    line: AtomicU32,
    locals: Scope,
    globals: Scope,
    parent: Option<FrameRef>,
}

impl SimFrame {
    pub fn new(
        file: impl Into<PathBuf>,
        function: impl Into<String>,
        parent: Option<FrameRef>,
        locals: Scope,
        globals: Scope,
    ) -> Self {
        Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::SeqCst),
            file: file.into(),
            function: function.into(),
            line: AtomicU32::new(0),
            locals,
            globals,
            parent,
        }
    }

    pub fn scope(vars: BTreeMap<String, Value>) -> Scope {
        Arc::new(Mutex::new(vars))
    }

    pub fn set_line(&self, line: u32) {
        self.line.store(line, Ordering::SeqCst);
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.local(name).or_else(|| self.global(name))
    }
}

fn read(scope: &Scope) -> MutexGuard<'_, BTreeMap<String, Value>> {
    // A panic elsewhere must not hide variables from the debugger
    scope.lock().unwrap_or_else(|e| e.into_inner())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl HostFrame for SimFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn file(&self) -> &Path {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line.load(Ordering::SeqCst)
    }

    fn function(&self) -> &str {
        &self.function
    }

    fn parent(&self) -> Option<FrameRef> {
        self.parent.clone()
    }

    fn local(&self, name: &str) -> Option<Value> {
        read(&self.locals).get(name).cloned()
    }

    fn global(&self, name: &str) -> Option<Value> {
        read(&self.globals).get(name).cloned()
    }

    fn locals(&self) -> BTreeMap<String, Value> {
        read(&self.locals).clone()
    }

    fn set_local(&self, name: &str, value: Value) {
        read(&self.locals).insert(name.to_string(), value);
    }

    fn set_global(&self, name: &str, value: Value) {
        read(&self.globals).insert(name.to_string(), value);
    }

    /// Supports `name`, `name == <json>` and `name != <json>`.
    fn evaluate_condition(&self, condition: &str) -> Result<bool, ScriptError> {
        let condition = condition.trim();
        let (name, comparison) = if let Some((name, literal)) = condition.split_once("==") {
            (name.trim(), Some((true, literal.trim())))
        } else if let Some((name, literal)) = condition.split_once("!=") {
            (name.trim(), Some((false, literal.trim())))
        } else {
            (condition, None)
        };

        if !is_identifier(name) {
            return Err(ScriptError::new(format!("unsupported condition: {}", condition)));
        }
        let value = self
            .lookup(name)
            .ok_or_else(|| ScriptError::new(format!("name '{}' is not defined", name)))?;

        match comparison {
            None => Ok(value.is_truthy()),
            Some((equal, literal)) => {
                let expected: Value = serde_json::from_str(literal).map_err(|e| {
                    ScriptError::new(format!("invalid literal {:?}: {}", literal, e))
                })?;
                Ok((value == expected) == equal)
            }
        }
    }
}

/// Runs `SimProgram` files.
#[derive(Debug, Default)]
pub struct SimHost;

impl SimHost {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptHost for SimHost {
    fn execute(&mut self, path: &Path, hook: &mut dyn TraceHook) -> DebugResult<()> {
        let program = SimProgram::load(path)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!(
            "Executing {} ({} functions)",
            path.display(),
            program.functions.len()
        );

        let globals = SimFrame::scope(program.globals.clone());

        // Outermost frame of the embedding, at pseudo-line 0
        let entry: FrameRef = Arc::new(SimFrame::new(
            ENTRY_FILE,
            "<entry>",
            None,
            SimFrame::scope(BTreeMap::new()),
            globals.clone(),
        ));
        hook.on_call(&entry)?;
        hook.on_line(&entry)?;

        // Module level: locals are the globals
        let module = Arc::new(SimFrame::new(
            path,
            "<module>",
            Some(entry),
            globals.clone(),
            globals,
        ));

        let mut interpreter = Interpreter {
            program: &program,
            base,
            hook,
            depth: 1,
        };
        interpreter.run_frame(module, &program.body)
    }
}

struct Interpreter<'a> {
    program: &'a SimProgram,
    base: PathBuf,
    hook: &'a mut dyn TraceHook,
    depth: usize,
}

impl Interpreter<'_> {
    fn run_frame(&mut self, frame: Arc<SimFrame>, body: &[Statement]) -> DebugResult<()> {
        let frame_ref: FrameRef = frame.clone();
        self.hook.on_call(&frame_ref)?;

        for statement in body {
            frame.set_line(statement.line());
            self.hook.on_line(&frame_ref)?;
            self.execute(&frame, &frame_ref, statement)?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        frame: &SimFrame,
        frame_ref: &FrameRef,
        statement: &Statement,
    ) -> DebugResult<()> {
        let fail = |message: String| -> DebugError {
            ScriptError::new(message)
                .at(frame.file(), statement.line())
                .into()
        };

        match statement {
            Statement::Set { set, value, .. } => frame.set_local(set, value.clone()),
            Statement::Copy { set, from, .. } => {
                let value = frame
                    .lookup(from)
                    .ok_or_else(|| fail(format!("name '{}' is not defined", from)))?;
                frame.set_local(set, value);
            }
            Statement::Global { global, value, .. } => frame.set_global(global, value.clone()),
            Statement::Call { call, .. } => {
                let program = self.program;
                let function = program
                    .functions
                    .get(call)
                    .ok_or_else(|| fail(format!("name '{}' is not defined", call)))?;
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(fail("maximum recursion depth exceeded".to_string()));
                }

                let file = match &function.file {
                    Some(file) => self.base.join(file),
                    None => frame.file().to_path_buf(),
                };
                let callee = Arc::new(SimFrame::new(
                    file,
                    call.as_str(),
                    Some(frame_ref.clone()),
                    SimFrame::scope(BTreeMap::new()),
                    frame.globals.clone(),
                ));

                self.depth += 1;
                let result = self.run_frame(callee, &function.body);
                self.depth -= 1;
                result?;
            }
            Statement::Fail { fail: message, .. } => return Err(fail(message.clone())),
            Statement::Pass { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Records every hook call as (kind, function, line).
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(&'static str, String, u32)>,
        last: Option<FrameRef>,
    }

    impl TraceHook for Recorder {
        fn on_call(&mut self, frame: &FrameRef) -> DebugResult<()> {
            self.seen.push(("call", frame.function().to_string(), frame.line()));
            Ok(())
        }

        fn on_line(&mut self, frame: &FrameRef) -> DebugResult<()> {
            self.seen.push(("line", frame.function().to_string(), frame.line()));
            self.last = Some(frame.clone());
            Ok(())
        }
    }

    fn write_program(dir: &Path, name: &str, json: serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_hook_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({
                "body": [
                    { "line": 1, "set": "x", "value": 1 },
                    { "line": 2, "call": "f" },
                    { "line": 3 }
                ],
                "functions": { "f": { "body": [ { "line": 6, "set": "y", "value": 2 } ] } }
            }),
        );

        let mut recorder = Recorder::default();
        SimHost::new().execute(&path, &mut recorder).unwrap();

        let kinds: Vec<_> = recorder
            .seen
            .iter()
            .map(|(kind, func, line)| format!("{} {} {}", kind, func, line))
            .collect();
        assert_eq!(
            kinds,
            vec![
                "call <entry> 0",
                "line <entry> 0",
                "call <module> 0",
                "line <module> 1",
                "line <module> 2",
                "call f 0",
                "line f 6",
                "line <module> 3",
            ]
        );
    }

    #[test]
    fn test_module_locals_are_globals() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({
                "globals": { "g": 1 },
                "body": [ { "line": 1, "set": "x", "value": 5 }, { "line": 2 } ]
            }),
        );

        let mut recorder = Recorder::default();
        SimHost::new().execute(&path, &mut recorder).unwrap();

        let frame = recorder.last.unwrap();
        assert_eq!(frame.global("x"), Some(Value::Int(5)));
        assert_eq!(frame.local("g"), Some(Value::Int(1)));
        assert_eq!(frame.depth(), 2);
    }

    #[test]
    fn test_fail_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({ "body": [ { "line": 4, "fail": "division by zero" } ] }),
        );

        let err = SimHost::new()
            .execute(&path, &mut Recorder::default())
            .unwrap_err();
        let err = match err {
            DebugError::Script(err) => err,
            other => panic!("expected script error, got {:?}", other),
        };
        assert_eq!(err.message, "division by zero");
        assert_eq!(err.line, Some(4));
    }

    #[test]
    fn test_copy_of_unknown_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({ "body": [ { "line": 1, "set": "a", "from": "missing" } ] }),
        );

        let err = SimHost::new()
            .execute(&path, &mut Recorder::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "name 'missing' is not defined");
    }

    #[test]
    fn test_runaway_recursion_is_a_script_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({
                "body": [ { "line": 1, "call": "f" } ],
                "functions": { "f": { "body": [ { "line": 3, "call": "f" } ] } }
            }),
        );

        let err = SimHost::new()
            .execute(&path, &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(err, DebugError::Script(_)));
    }

    #[test]
    fn test_invalid_program_is_a_script_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SimHost::new()
            .execute(&path, &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(err, DebugError::Script(_)));
    }

    #[test]
    fn test_misspelled_statement_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({ "body": [ { "line": 1, "sett": "x", "value": 1 } ] }),
        );

        let mut recorder = Recorder::default();
        let err = SimHost::new().execute(&path, &mut recorder).unwrap_err();
        assert!(matches!(err, DebugError::Script(_)));
        assert!(recorder.seen.is_empty());
    }

    #[test]
    fn test_function_file_is_relative_to_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_program(
            dir.path(),
            "main.json",
            serde_json::json!({
                "body": [ { "line": 1, "call": "helper" } ],
                "functions": { "helper": { "file": "lib.json", "body": [ { "line": 2 } ] } }
            }),
        );

        let mut recorder = Recorder::default();
        SimHost::new().execute(&path, &mut recorder).unwrap();
        assert_eq!(recorder.last.unwrap().file(), dir.path().join("lib.json"));
    }

    #[test]
    fn test_conditions() {
        let vars = SimFrame::scope(
            [
                ("n".to_string(), Value::Int(3)),
                ("name".to_string(), Value::from("bob")),
                ("empty".to_string(), Value::List(vec![])),
            ]
            .into(),
        );
        let frame = Arc::new(SimFrame::new("/tmp/a.json", "f", None, vars.clone(), vars));

        assert!(frame.evaluate_condition("n == 3").unwrap());
        assert!(frame.evaluate_condition("n != 4").unwrap());
        assert!(frame.evaluate_condition("name == \"bob\"").unwrap());
        assert!(frame.evaluate_condition("n").unwrap());
        assert!(!frame.evaluate_condition("empty").unwrap());
        assert!(frame.evaluate_condition("missing").is_err());
        assert!(frame.evaluate_condition("n < 4").is_err());
        assert!(frame.evaluate_condition("n == three").is_err());
    }
}
