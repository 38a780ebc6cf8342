// Host runtime seam
//
// A host executes a script file on the debuggee thread and reports each call
// and line to a `TraceHook` before running it.

use crate::error::DebugResult;
use crate::frame::FrameRef;
use std::path::Path;

/// Callbacks a host invokes while executing.
///
/// An `Err` from a hook is the abort signal: the host must stop executing
/// and return that same error from `ScriptHost::execute`.
pub trait TraceHook {
    /// Before the first line of a new frame.
    fn on_call(&mut self, frame: &FrameRef) -> DebugResult<()>;

    /// Before each line.
    fn on_line(&mut self, frame: &FrameRef) -> DebugResult<()>;
}

/// A script runtime the debugger can drive.
pub trait ScriptHost {
    /// Run the script at `path` to completion. Errors raised by the script are
    /// returned as `DebugError::Script`.
    fn execute(&mut self, path: &Path, hook: &mut dyn TraceHook) -> DebugResult<()>;
}

impl<H: ScriptHost + ?Sized> ScriptHost for &mut H {
    fn execute(&mut self, path: &Path, hook: &mut dyn TraceHook) -> DebugResult<()> {
        (**self).execute(path, hook)
    }
}
