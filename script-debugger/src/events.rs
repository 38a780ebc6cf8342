// Debugger events
//
// Notifications sent from the debuggee thread to whoever drives the session.

use crate::types::{BreakpointSpec, ResumeReason, RunOutcome, StackFrameSnapshot, ThreadId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DebugEvent {
    Started {
        thread: ThreadId,
    },
    Suspended {
        thread: ThreadId,
        stack: StackFrameSnapshot,
    },
    Resumed {
        thread: ThreadId,
        reason: ResumeReason,
    },
    Terminated {
        thread: ThreadId,
        outcome: RunOutcome,
    },
}

impl DebugEvent {
    pub fn thread(&self) -> ThreadId {
        match self {
            DebugEvent::Started { thread }
            | DebugEvent::Suspended { thread, .. }
            | DebugEvent::Resumed { thread, .. }
            | DebugEvent::Terminated { thread, .. } => *thread,
        }
    }
}

/// Receives engine notifications. Called on the debuggee thread, so
/// implementations must not block.
pub trait EventBridge: Send + Sync {
    fn notify(&self, event: DebugEvent);
}

/// Supplies the breakpoints that belong to a source file.
pub trait BreakpointProvider: Send + Sync {
    fn breakpoints_for(&self, file: &Path) -> Vec<BreakpointSpec>;

    /// A temporary breakpoint fired and was removed from the engine.
    fn consumed(&self, _spec: &BreakpointSpec) {}
}

impl<T: EventBridge + ?Sized> EventBridge for Arc<T> {
    fn notify(&self, event: DebugEvent) {
        (**self).notify(event)
    }
}

impl<T: BreakpointProvider + ?Sized> BreakpointProvider for Arc<T> {
    fn breakpoints_for(&self, file: &Path) -> Vec<BreakpointSpec> {
        (**self).breakpoints_for(file)
    }

    fn consumed(&self, spec: &BreakpointSpec) {
        (**self).consumed(spec)
    }
}
