// Line-level script debugger engine
//
// Synchronizes a debuggee thread executing a script with a control thread
// that drives the debugging session:
// - Breakpoints (conditional, temporary, hit counts, lazy per-file install)
// - Suspension handshake and step directives
// - Stack snapshots and variable inspection
// - Event notifications over a channel

pub mod error;
pub mod types;
pub mod config;
pub mod breakpoint;
pub mod step;
pub mod frame;
pub mod stacktrace;
pub mod gate;
pub mod events;
pub mod bridge;
pub mod host;
pub mod engine;
pub mod sim;

pub use bridge::{event_channel, ChannelBridge, EventHandle};
pub use config::DebuggerConfig;
pub use engine::Debugger;
pub use error::{DebugError, DebugResult, ScriptError};
pub use events::{BreakpointProvider, DebugEvent, EventBridge};
pub use frame::{FrameRef, HostFrame};
pub use host::{ScriptHost, TraceHook};
pub use types::{BreakpointSpec, ResumeReason, RunOutcome, StackFrame, StackFrameSnapshot, Value};
