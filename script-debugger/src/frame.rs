// Frame handles and the suspended-frame store
//
// The host runtime hands out `FrameRef`s; the engine keeps the one it is
// suspended in so the control thread can read and write its variables.

use crate::error::{lock, DebugResult, ScriptError};
use crate::types::{FrameId, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub type FrameRef = Arc<dyn HostFrame>;

/// One active function invocation inside the host runtime.
///
/// Setters take `&self`: a frame is shared between the debuggee thread that
/// executes it and the control thread that edits it while suspended.
pub trait HostFrame: Send + Sync + fmt::Debug {
    /// Identity of this invocation, unique for the lifetime of a run.
    fn id(&self) -> FrameId;

    fn file(&self) -> &Path;

    /// Line about to execute. Values below 1 mark synthetic entry points.
    fn line(&self) -> u32;

    fn function(&self) -> &str;

    /// Caller frame, `None` for the outermost one.
    fn parent(&self) -> Option<FrameRef>;

    fn local(&self, name: &str) -> Option<Value>;

    fn global(&self, name: &str) -> Option<Value>;

    fn locals(&self) -> BTreeMap<String, Value>;

    fn set_local(&self, name: &str, value: Value);

    fn set_global(&self, name: &str, value: Value);

    /// Evaluate a breakpoint condition in this frame's scope.
    fn evaluate_condition(&self, condition: &str) -> Result<bool, ScriptError>;

    /// Number of frames in the chain, this one included.
    fn depth(&self) -> usize {
        let mut depth = 1;
        let mut next = self.parent();
        while let Some(frame) = next {
            depth += 1;
            next = frame.parent();
        }
        depth
    }
}

/// Holds the frame the debuggee is currently stopped in.
///
/// `present` is only a hint for skipping the lock when nothing is stored;
/// every decision is taken again under `current`'s lock.
#[derive(Default)]
pub struct FrameStateStore {
    present: AtomicBool,
    current: Mutex<Option<FrameRef>>,
}

impl FrameStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, frame: FrameRef) -> DebugResult<()> {
        let mut current = lock(&self.current, "frame")?;
        *current = Some(frame);
        self.present.store(true, Ordering::Release);
        Ok(())
    }

    pub fn clear(&self) -> DebugResult<()> {
        let mut current = lock(&self.current, "frame")?;
        *current = None;
        self.present.store(false, Ordering::Release);
        Ok(())
    }

    pub fn current(&self) -> DebugResult<Option<FrameRef>> {
        if !self.present.load(Ordering::Acquire) {
            return Ok(None);
        }
        let current = lock(&self.current, "frame")?;
        Ok(current.clone())
    }

    /// Locals shadow globals.
    pub fn get_variable(&self, name: &str) -> DebugResult<Option<Value>> {
        if !self.present.load(Ordering::Acquire) {
            return Ok(None);
        }
        let current = lock(&self.current, "frame")?;
        Ok(current
            .as_ref()
            .and_then(|frame| frame.local(name).or_else(|| frame.global(name))))
    }

    pub fn list_variables(&self) -> DebugResult<Option<BTreeMap<String, Value>>> {
        if !self.present.load(Ordering::Acquire) {
            return Ok(None);
        }
        let current = lock(&self.current, "frame")?;
        Ok(current.as_ref().map(|frame| frame.locals()))
    }

    /// Writes an existing local, otherwise the global scope.
    /// Returns false when no frame is stored.
    pub fn set_variable(&self, name: &str, value: Value) -> DebugResult<bool> {
        if !self.present.load(Ordering::Acquire) {
            return Ok(false);
        }
        let current = lock(&self.current, "frame")?;
        let Some(frame) = current.as_ref() else {
            return Ok(false);
        };

        if frame.local(name).is_some() {
            debug!("Setting local {} in {}", name, frame.function());
            frame.set_local(name, value);
        } else {
            debug!("Setting global {} from {}", name, frame.function());
            frame.set_global(name, value);
        }
        Ok(true)
    }
}
