// Debugger type definitions
//
// Common types shared by the engine, the host seam and the control surface

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

pub type ThreadId = u64;
pub type FrameId = u64;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<ThreadId> = const { Cell::new(0) };
}

/// Stable identity of the calling thread, assigned on first use.
pub fn current_thread_id() -> ThreadId {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::SeqCst));
        }
        id.get()
    })
}

// Script value as seen by the debugger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Format value for display
    pub fn format(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(v) => format!("(bool) {}", v),
            Value::Int(v) => format!("(int) {}", v),
            Value::Float(v) => format!("(float) {}", v),
            Value::Str(v) => format!("(str) {:?}", v),
            Value::List(items) => format!("(list) [{} items]", items.len()),
            Value::Map(entries) => format!("(dict) {{{} entries}}", entries.len()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(v) => !v.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Breakpoint request, keyed by `(file, line)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub file: PathBuf,
    pub line: u32,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub hit_count: u32,
}

impl BreakpointSpec {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            temporary: false,
            condition: None,
            hit_count: 0,
        }
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_hit_count(mut self, hit_count: u32) -> Self {
        self.hit_count = hit_count;
        self
    }
}

// One entry of a stack snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: PathBuf,
    pub line: u32,
    pub function: String,
    pub locals: BTreeMap<String, Value>,
}

/// Innermost-first stack copy taken at suspension time.
pub type StackFrameSnapshot = Vec<StackFrame>;

// Why the debuggee resumed. Codes follow the host debug event constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeReason {
    Unset,
    Continue,
    StepOver,
    StepInto,
    StepOut,
}

impl ResumeReason {
    pub fn code(self) -> i32 {
        match self {
            ResumeReason::Unset => -1,
            ResumeReason::StepInto => 0x1,
            ResumeReason::StepOver => 0x2,
            ResumeReason::StepOut => 0x4,
            ResumeReason::Continue => 0x20,
        }
    }
}

impl fmt::Display for ResumeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResumeReason::Unset => "unset",
            ResumeReason::Continue => "continue",
            ResumeReason::StepOver => "step over",
            ResumeReason::StepInto => "step into",
            ResumeReason::StepOut => "step out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunOutcome {
    Completed,
    Aborted,
    Failed { message: String },
}
