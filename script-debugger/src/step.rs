// Step directives and stop-mode tracking
//
// The control thread arms one directive per suspension; the debuggee thread
// consumes it on wake-up and applies it to its `StepEngine`.

use crate::error::{lock, DebugError, DebugResult};
use crate::frame::{FrameRef, HostFrame};
use crate::types::{FrameId, ResumeReason};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// How execution proceeds after a suspension.
#[derive(Clone)]
pub enum StepDirective {
    Continue,
    StepOver(FrameRef),
    StepInto,
    StepOut(FrameRef),
    Quit,
}

impl StepDirective {
    pub fn reason(&self) -> ResumeReason {
        match self {
            StepDirective::Continue => ResumeReason::Continue,
            StepDirective::StepOver(_) => ResumeReason::StepOver,
            StepDirective::StepInto => ResumeReason::StepInto,
            StepDirective::StepOut(_) => ResumeReason::StepOut,
            StepDirective::Quit => ResumeReason::Unset,
        }
    }

    pub fn apply(&self, engine: &mut dyn StepEngine) {
        match self {
            StepDirective::Continue => engine.continue_execution(),
            StepDirective::StepOver(frame) => engine.step_over_current_line(frame.as_ref()),
            StepDirective::StepInto => engine.step_into(),
            StepDirective::StepOut(frame) => engine.step_out_of_frame(frame.as_ref()),
            StepDirective::Quit => engine.abort(),
        }
    }
}

impl fmt::Debug for StepDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepDirective::Continue => f.write_str("Continue"),
            StepDirective::StepOver(frame) => write!(f, "StepOver(frame {})", frame.id()),
            StepDirective::StepInto => f.write_str("StepInto"),
            StepDirective::StepOut(frame) => write!(f, "StepOut(frame {})", frame.id()),
            StepDirective::Quit => f.write_str("Quit"),
        }
    }
}

/// Line-stepping primitives of the execution tracer.
pub trait StepEngine {
    fn continue_execution(&mut self);
    fn step_into(&mut self);
    fn step_over_current_line(&mut self, frame: &dyn HostFrame);
    fn step_out_of_frame(&mut self, frame: &dyn HostFrame);
    fn abort(&mut self);
}

#[derive(Debug)]
struct StepSlot {
    pending: Option<StepDirective>,
    accepting: bool,
    reason: ResumeReason,
}

impl Default for StepSlot {
    fn default() -> Self {
        Self {
            pending: None,
            accepting: false,
            reason: ResumeReason::Unset,
        }
    }
}

/// Pending-directive slot shared by the control and debuggee threads.
///
/// `armed` lets the debuggee skip the lock when nothing is pending; the
/// directive itself is only ever read under the lock.
#[derive(Default)]
pub struct StepController {
    armed: AtomicBool,
    slot: Mutex<StepSlot>,
}

impl StepController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting a directive for a new suspension.
    pub fn open(&self) -> DebugResult<()> {
        let mut slot = lock(&self.slot, "step")?;
        slot.accepting = true;
        Ok(())
    }

    /// Stop accepting directives without consuming anything.
    pub fn close(&self) -> DebugResult<()> {
        let mut slot = lock(&self.slot, "step")?;
        slot.accepting = false;
        Ok(())
    }

    pub fn is_open(&self) -> DebugResult<bool> {
        Ok(lock(&self.slot, "step")?.accepting)
    }

    /// Store the directive for the current suspension. Only the first
    /// directive of a suspension is accepted.
    pub fn arm(&self, directive: StepDirective) -> DebugResult<()> {
        let mut slot = lock(&self.slot, "step")?;
        if !slot.accepting {
            return Err(DebugError::NotSuspended("step directive needs a suspended session"));
        }

        debug!("Arming {:?}", directive);
        slot.reason = directive.reason();
        slot.pending = Some(directive);
        slot.accepting = false;
        self.armed.store(true, Ordering::Release);
        Ok(())
    }

    /// Apply and clear the pending directive. Returns whether one was applied.
    pub fn consume_and_apply(&self, engine: &mut dyn StepEngine) -> DebugResult<bool> {
        if !self.armed.load(Ordering::Acquire) {
            return Ok(false);
        }

        let mut slot = lock(&self.slot, "step")?;
        let Some(directive) = slot.pending.take() else {
            return Ok(false);
        };
        self.armed.store(false, Ordering::Release);

        debug!("Applying {:?}", directive);
        directive.apply(engine);
        Ok(true)
    }

    pub fn resume_reason(&self) -> DebugResult<ResumeReason> {
        Ok(lock(&self.slot, "step")?.reason)
    }

    pub fn clear_reason(&self) -> DebugResult<()> {
        lock(&self.slot, "step")?.reason = ResumeReason::Unset;
        Ok(())
    }

    /// Forget everything, used between runs.
    pub fn reset(&self) -> DebugResult<()> {
        let mut slot = lock(&self.slot, "step")?;
        *slot = StepSlot::default();
        self.armed.store(false, Ordering::Release);
        Ok(())
    }
}

/// Where the tracer should stop next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopMode {
    /// Next line anywhere.
    Step,
    /// A later line of `frame`, or any line once `frame` has returned.
    Until { frame: FrameId, line: u32, depth: usize },
    /// Any line once the frame at `depth` has returned.
    Return { depth: usize },
    /// Breakpoints only.
    Continue,
}

/// Per-run stop decision state. A fresh run starts in `StopMode::Step`.
#[derive(Debug)]
pub struct StepState {
    mode: StopMode,
    quitting: bool,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            mode: StopMode::Step,
            quitting: false,
        }
    }
}

impl StepState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &StopMode {
        &self.mode
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub fn stop_here(&self, frame: &dyn HostFrame) -> bool {
        match &self.mode {
            StopMode::Step => true,
            StopMode::Until {
                frame: target,
                line,
                depth,
            } => {
                if frame.id() == *target {
                    frame.line() > *line
                } else {
                    frame.depth() < *depth
                }
            }
            StopMode::Return { depth } => frame.depth() < *depth,
            StopMode::Continue => false,
        }
    }
}

impl StepEngine for StepState {
    fn continue_execution(&mut self) {
        self.mode = StopMode::Continue;
    }

    fn step_into(&mut self) {
        self.mode = StopMode::Step;
    }

    fn step_over_current_line(&mut self, frame: &dyn HostFrame) {
        self.mode = StopMode::Until {
            frame: frame.id(),
            line: frame.line(),
            depth: frame.depth(),
        };
    }

    fn step_out_of_frame(&mut self, frame: &dyn HostFrame) {
        self.mode = StopMode::Return {
            depth: frame.depth(),
        };
    }

    fn abort(&mut self) {
        self.quitting = true;
    }
}
