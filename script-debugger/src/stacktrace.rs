// Stack snapshots
//
// Walks a frame chain innermost first. The first frame whose file is not on
// disk marks the start of host/builtin frames; it and everything outside it
// are left out.

use crate::frame::FrameRef;
use crate::types::{StackFrame, StackFrameSnapshot};
use tracing::debug;

pub struct StackTraceBuilder;

impl StackTraceBuilder {
    pub fn build(current: &FrameRef) -> StackFrameSnapshot {
        let mut stack = Vec::new();
        let mut next = Some(current.clone());

        while let Some(frame) = next {
            if !frame.file().exists() {
                debug!(
                    "Stack walk stopped at unresolvable {}",
                    frame.file().display()
                );
                break;
            }

            stack.push(StackFrame {
                file: frame.file().to_path_buf(),
                line: frame.line(),
                function: frame.function().to_string(),
                locals: frame.locals(),
            });
            next = frame.parent();
        }

        stack
    }
}
