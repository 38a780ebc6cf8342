// Debugger engine
//
// `Debugger` is shared between the debuggee thread, which calls `run`, and a
// control thread, which sets breakpoints and issues step directives while the
// debuggee is suspended. Each run gets its own `Tracer`, the `TraceHook` the
// host calls before every frame and line.

use crate::breakpoint::BreakpointTable;
use crate::config::DebuggerConfig;
use crate::error::{lock, DebugError, DebugResult};
use crate::events::{BreakpointProvider, DebugEvent, EventBridge};
use crate::frame::{FrameRef, FrameStateStore};
use crate::gate::SuspendGate;
use crate::host::{ScriptHost, TraceHook};
use crate::stacktrace::StackTraceBuilder;
use crate::step::{StepController, StepDirective, StepEngine, StepState};
use crate::types::{
    current_thread_id, BreakpointSpec, ResumeReason, RunOutcome, StackFrameSnapshot, ThreadId,
    Value,
};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct Debugger {
    config: DebuggerConfig,
    breakpoints: Mutex<BreakpointTable>,
    frames: FrameStateStore,
    steps: StepController,
    gate: SuspendGate,
    bridge: Box<dyn EventBridge>,
    provider: Option<Box<dyn BreakpointProvider>>,
    running: AtomicBool,
    suspended: AtomicBool,
}

impl Debugger {
    pub fn new(config: DebuggerConfig, bridge: impl EventBridge + 'static) -> Self {
        Self {
            config,
            breakpoints: Mutex::new(BreakpointTable::new()),
            frames: FrameStateStore::new(),
            steps: StepController::new(),
            gate: SuspendGate::new(),
            bridge: Box::new(bridge),
            provider: None,
            running: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        }
    }

    /// Install breakpoints lazily from `provider` as files are entered.
    pub fn with_breakpoint_provider(mut self, provider: impl BreakpointProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    // Breakpoints

    pub fn set_breakpoint(&self, spec: BreakpointSpec) -> DebugResult<()> {
        info!("Setting breakpoint at {}:{}", spec.file.display(), spec.line);
        lock(&self.breakpoints, "breakpoint")?.set(spec)
    }

    pub fn update_breakpoint(&self, spec: BreakpointSpec) -> DebugResult<()> {
        info!("Updating breakpoint at {}:{}", spec.file.display(), spec.line);
        lock(&self.breakpoints, "breakpoint")?.update(spec)
    }

    /// Returns the removed spec, if there was one.
    pub fn clear_breakpoint(&self, file: &Path, line: u32) -> DebugResult<Option<BreakpointSpec>> {
        let removed = lock(&self.breakpoints, "breakpoint")?.clear(file, line);
        if removed.is_some() {
            info!("Cleared breakpoint at {}:{}", file.display(), line);
        }
        Ok(removed)
    }

    pub fn clear_file_breakpoints(&self, file: &Path) -> DebugResult<usize> {
        Ok(lock(&self.breakpoints, "breakpoint")?.clear_file(file))
    }

    pub fn get_breakpoint(&self, file: &Path, line: u32) -> DebugResult<Option<BreakpointSpec>> {
        Ok(lock(&self.breakpoints, "breakpoint")?
            .get(file, line)
            .cloned())
    }

    pub fn breakpoints(&self) -> DebugResult<Vec<BreakpointSpec>> {
        Ok(lock(&self.breakpoints, "breakpoint")?.list())
    }

    // Stepping

    pub fn step_continue(&self) -> DebugResult<()> {
        self.resume_with(StepDirective::Continue)
    }

    pub fn step_over(&self) -> DebugResult<()> {
        let frame = self.suspended_frame()?;
        self.resume_with(StepDirective::StepOver(frame))
    }

    pub fn step_into(&self) -> DebugResult<()> {
        self.resume_with(StepDirective::StepInto)
    }

    pub fn step_out(&self) -> DebugResult<()> {
        let frame = self.suspended_frame()?;
        self.resume_with(StepDirective::StepOut(frame))
    }

    /// Abort the run at the next resume.
    pub fn quit(&self) -> DebugResult<()> {
        self.resume_with(StepDirective::Quit)
    }

    fn resume_with(&self, directive: StepDirective) -> DebugResult<()> {
        if let Err(e) = self.steps.arm(directive) {
            warn!("Rejected step directive: {}", e);
            return Err(e);
        }
        self.gate.signal()
    }

    fn suspended_frame(&self) -> DebugResult<FrameRef> {
        if !self.is_suspended() {
            return Err(DebugError::NotSuspended("stepping needs a suspended frame"));
        }
        self.frames
            .current()?
            .ok_or(DebugError::NotSuspended("stepping needs a suspended frame"))
    }

    // Inspection

    pub fn get_variable(&self, name: &str) -> DebugResult<Option<Value>> {
        self.frames.get_variable(name)
    }

    pub fn list_variables(&self) -> DebugResult<Option<BTreeMap<String, Value>>> {
        self.frames.list_variables()
    }

    /// Returns false when there is no frame to write into.
    pub fn set_variable(&self, name: &str, value: Value) -> DebugResult<bool> {
        self.frames.set_variable(name, value)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stack of the suspended frame, `None` while not suspended.
    pub fn current_stack(&self) -> DebugResult<Option<StackFrameSnapshot>> {
        if !self.is_suspended() {
            return Ok(None);
        }
        Ok(self
            .frames
            .current()?
            .map(|frame| StackTraceBuilder::build(&frame)))
    }

    pub fn resume_reason(&self) -> DebugResult<ResumeReason> {
        self.steps.resume_reason()
    }

    // Execution

    /// Run the script at `path` on the calling thread, which becomes the
    /// debuggee thread until the run ends.
    ///
    /// Script errors are returned unchanged. A quit ends the run with
    /// `Ok(RunOutcome::Aborted)`.
    pub fn run<H>(&self, path: impl AsRef<Path>, host: &mut H) -> DebugResult<RunOutcome>
    where
        H: ScriptHost + ?Sized,
    {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DebugError::InvalidArgument(
                "filename for run must not be empty".to_string(),
            ));
        }
        if !path.exists() {
            return Err(DebugError::FileNotFound(path.to_path_buf()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DebugError::AlreadyRunning);
        }

        let thread = current_thread_id();
        info!("Starting {} on thread {}", path.display(), thread);
        self.bridge.notify(DebugEvent::Started { thread });

        let mut tracer = Tracer::new(self, thread);
        let result = host.execute(path, &mut tracer);

        if let Err(e) = self.finish_run() {
            error!("Failed to reset debugger state: {}", e);
        }

        let outcome = match &result {
            Ok(()) => RunOutcome::Completed,
            Err(DebugError::Aborted) => RunOutcome::Aborted,
            Err(e) => RunOutcome::Failed {
                message: e.to_string(),
            },
        };
        info!("Run of {} ended: {:?}", path.display(), outcome);
        self.bridge.notify(DebugEvent::Terminated {
            thread,
            outcome: outcome.clone(),
        });

        match result {
            Ok(()) | Err(DebugError::Aborted) => Ok(outcome),
            Err(e) => Err(e),
        }
    }

    fn finish_run(&self) -> DebugResult<()> {
        self.suspended.store(false, Ordering::SeqCst);
        self.frames.clear()?;
        self.steps.reset()?;
        self.gate.reset()?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn break_here(&self, frame: &FrameRef) -> DebugResult<bool> {
        let (stop, consumed) = {
            let mut table = lock(&self.breakpoints, "breakpoint")?;
            if table.is_empty() {
                return Ok(false);
            }
            let stop = table.should_break(frame.as_ref());
            (stop, table.take_consumed())
        };

        if let Some(provider) = &self.provider {
            for spec in &consumed {
                provider.consumed(spec);
            }
        }
        Ok(stop)
    }

    /// Bring the breakpoints of `file` in line with the provider's.
    fn install_breakpoints(&self, file: &Path) -> DebugResult<()> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };

        let specs = provider.breakpoints_for(file);
        let wanted = specs.len();
        let installed = lock(&self.breakpoints, "breakpoint")?.sync(file, specs);
        debug!(
            "Synced {} breakpoints for {} ({} new or changed)",
            wanted,
            file.display(),
            installed
        );
        Ok(())
    }
}

/// Per-run trace hook.
struct Tracer<'a> {
    debugger: &'a Debugger,
    thread: ThreadId,
    state: StepState,
    first_stop: bool,
    current_file: Option<PathBuf>,
    loaded: HashSet<PathBuf>,
}

impl<'a> Tracer<'a> {
    fn new(debugger: &'a Debugger, thread: ThreadId) -> Self {
        Self {
            debugger,
            thread,
            state: StepState::new(),
            first_stop: true,
            current_file: None,
            loaded: HashSet::new(),
        }
    }

    fn check_quit(&self) -> DebugResult<()> {
        if self.state.is_quitting() {
            return Err(DebugError::Aborted);
        }
        Ok(())
    }

    fn should_stop(&mut self, frame: &FrameRef) -> DebugResult<bool> {
        if self.first_stop {
            self.first_stop = false;
            if !self.debugger.config.suspend_on_startup {
                // Start unobserved; only breakpoints stop from here on
                debug!("Suspend on startup disabled, continuing");
                self.state.continue_execution();
                return self.debugger.break_here(frame);
            }
            return Ok(true);
        }
        if self.state.stop_here(frame.as_ref()) {
            return Ok(true);
        }
        self.debugger.break_here(frame)
    }

    fn suspend(&mut self, frame: &FrameRef) -> DebugResult<()> {
        let debugger = self.debugger;
        debugger.steps.open()?;
        debugger.suspended.store(true, Ordering::SeqCst);

        let stack = StackTraceBuilder::build(frame);
        info!(
            "Suspended at {}:{} in {}",
            frame.file().display(),
            frame.line(),
            frame.function()
        );
        debugger.bridge.notify(DebugEvent::Suspended {
            thread: self.thread,
            stack,
        });

        let waited = debugger.gate.wait_for_signal(debugger.config.timeout());
        debugger.suspended.store(false, Ordering::SeqCst);
        if let Err(e) = waited {
            debugger.steps.close()?;
            return Err(e);
        }

        self.resume(frame)
    }

    fn resume(&mut self, frame: &FrameRef) -> DebugResult<()> {
        let debugger = self.debugger;

        // Breakpoints edited while suspended
        if frame.file().exists() {
            debugger.install_breakpoints(frame.file())?;
        }

        if !debugger.steps.consume_and_apply(&mut self.state)? {
            warn!("Woken without a step directive");
        }
        if self.state.is_quitting() {
            info!("Quit requested, aborting run");
            return Ok(());
        }

        let reason = debugger.steps.resume_reason()?;
        debug!("Resuming: {}", reason);
        debugger.bridge.notify(DebugEvent::Resumed {
            thread: self.thread,
            reason,
        });
        debugger.steps.clear_reason()
    }
}

impl TraceHook for Tracer<'_> {
    fn on_call(&mut self, frame: &FrameRef) -> DebugResult<()> {
        self.check_quit()?;

        let file = frame.file();
        if self.current_file.as_deref() == Some(file) {
            return Ok(());
        }
        debug!("Execution moved to {}", file.display());
        self.current_file = Some(file.to_path_buf());

        if !file.exists() {
            return Ok(());
        }
        self.debugger.install_breakpoints(file)?;

        let first_script = self.loaded.is_empty();
        if self.loaded.insert(file.to_path_buf())
            && !first_script
            && self.debugger.config.suspend_on_script_load
        {
            debug!("Suspending on load of {}", file.display());
            self.state.step_into();
        }
        Ok(())
    }

    fn on_line(&mut self, frame: &FrameRef) -> DebugResult<()> {
        self.check_quit()?;

        // Synthetic entry point, not a user-visible line
        if frame.line() < 1 {
            return Ok(());
        }

        self.debugger.frames.set_current(frame.clone())?;
        if !self.should_stop(frame)? {
            return Ok(());
        }

        self.suspend(frame)?;
        self.check_quit()
    }
}
