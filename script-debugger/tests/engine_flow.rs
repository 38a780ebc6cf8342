// Cross-thread debugging sessions driven through the public API

use script_debugger::sim::SimHost;
use script_debugger::{
    event_channel, BreakpointSpec, DebugError, DebugEvent, Debugger, DebuggerConfig,
    EventHandle, ResumeReason, RunOutcome, StackFrameSnapshot, Value,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

struct Session {
    debugger: Arc<Debugger>,
    events: EventHandle,
    run: Option<JoinHandle<Result<RunOutcome, DebugError>>>,
    _dir: tempfile::TempDir,
    script: PathBuf,
}

impl Session {
    fn new(config: DebuggerConfig, program: serde_json::Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.json");
        std::fs::write(&script, serde_json::to_string_pretty(&program).unwrap()).unwrap();

        let (bridge, events) = event_channel();
        Self {
            debugger: Arc::new(Debugger::new(config, bridge)),
            events,
            run: None,
            _dir: dir,
            script,
        }
    }

    fn start(&mut self) {
        let debugger = self.debugger.clone();
        let script = self.script.clone();
        self.run = Some(std::thread::spawn(move || {
            debugger.run(&script, &mut SimHost::new())
        }));
    }

    fn finish(&mut self) -> Result<RunOutcome, DebugError> {
        self.run.take().expect("run not started").join().unwrap()
    }

    async fn suspended(&self) -> StackFrameSnapshot {
        match self
            .events
            .wait_for(WAIT, |e| {
                matches!(
                    e,
                    DebugEvent::Suspended { .. } | DebugEvent::Terminated { .. }
                )
            })
            .await
        {
            Some(DebugEvent::Suspended { stack, .. }) => stack,
            other => panic!("expected suspension, got {:?}", other),
        }
    }

    async fn resumed(&self) -> ResumeReason {
        match self
            .events
            .wait_for(WAIT, |e| matches!(e, DebugEvent::Resumed { .. }))
            .await
        {
            Some(DebugEvent::Resumed { reason, .. }) => reason,
            other => panic!("expected resume, got {:?}", other),
        }
    }
}

fn nested_program() -> serde_json::Value {
    serde_json::json!({
        "globals": { "shared": 1 },
        "body": [
            { "line": 1, "set": "shared", "value": 2 },
            { "line": 2, "call": "outer" },
            { "line": 3 }
        ],
        "functions": {
            "outer": { "body": [
                { "line": 10, "set": "o", "value": 1 },
                { "line": 11, "call": "inner" },
                { "line": 12 }
            ] },
            "inner": { "body": [
                { "line": 20, "set": "shared", "value": "local" },
                { "line": 21 }
            ] }
        }
    })
}

fn depth_of(stack: &StackFrameSnapshot) -> usize {
    stack.len()
}

#[test]
fn test_run_fails_fast_with_distinct_errors() {
    let (bridge, _events) = event_channel();
    let debugger = Debugger::new(DebuggerConfig::default(), bridge);

    let empty = debugger.run("", &mut SimHost::new()).unwrap_err();
    let missing = debugger
        .run(Path::new("/missing/program.json"), &mut SimHost::new())
        .unwrap_err();

    assert!(matches!(empty, DebugError::InvalidArgument(_)));
    assert!(matches!(missing, DebugError::FileNotFound(_)));
}

#[tokio::test]
async fn test_stack_excludes_synthetic_entry_frame() {
    let mut session = Session::new(DebuggerConfig::default(), nested_program());
    session
        .debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 21))
        .unwrap();
    session.start();

    // inner, outer, <module>; the <string> entry frame is not on disk
    let stack = session.suspended().await;
    assert_eq!(stack.len(), 3);
    let names: Vec<_> = stack.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer", "<module>"]);
    assert_eq!(stack[1].line, 11);

    let on_demand = session.debugger.current_stack().unwrap().unwrap();
    assert_eq!(on_demand, stack);

    session.debugger.step_continue().unwrap();
    assert_eq!(session.finish().unwrap(), RunOutcome::Completed);
}

#[tokio::test]
async fn test_step_over_does_not_descend() {
    let mut session = Session::new(DebuggerConfig::default(), nested_program());
    session
        .debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 11))
        .unwrap();
    session.start();

    let stack = session.suspended().await;
    let stepped_from = depth_of(&stack);
    assert_eq!(stack[0].function, "outer");

    session.debugger.step_over().unwrap();
    let stack = session.suspended().await;
    assert!(depth_of(&stack) <= stepped_from);
    assert_eq!(stack[0].function, "outer");
    assert_eq!(stack[0].line, 12);

    session.debugger.step_continue().unwrap();
    session.finish().unwrap();
}

#[tokio::test]
async fn test_locals_shadow_globals() {
    let mut session = Session::new(DebuggerConfig::default(), nested_program());
    session
        .debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 21))
        .unwrap();
    session.start();
    session.suspended().await;

    let debugger = &session.debugger;
    assert_eq!(
        debugger.get_variable("shared").unwrap(),
        Some(Value::from("local"))
    );

    // Not a local of inner, so the write goes global
    assert!(debugger.set_variable("fresh", Value::Int(7)).unwrap());
    assert!(!debugger.list_variables().unwrap().unwrap().contains_key("fresh"));
    assert_eq!(debugger.get_variable("fresh").unwrap(), Some(Value::Int(7)));

    assert!(debugger.set_variable("shared", Value::Int(3)).unwrap());
    assert_eq!(
        debugger.list_variables().unwrap().unwrap()["shared"],
        Value::Int(3)
    );

    debugger.step_continue().unwrap();
    session.finish().unwrap();
}

#[tokio::test]
async fn test_resume_reason_is_reset_after_each_resume() {
    let mut session = Session::new(
        DebuggerConfig::new().suspend_on_startup(true),
        nested_program(),
    );
    session.start();
    session.suspended().await;

    session.debugger.step_into().unwrap();
    assert_eq!(session.resumed().await, ResumeReason::StepInto);
    session.suspended().await;
    assert_eq!(session.debugger.resume_reason().unwrap(), ResumeReason::Unset);

    session.debugger.step_over().unwrap();
    assert_eq!(session.resumed().await, ResumeReason::StepOver);
    session.suspended().await;
    assert_eq!(session.debugger.resume_reason().unwrap(), ResumeReason::Unset);

    session.debugger.step_continue().unwrap();
    assert_eq!(session.resumed().await, ResumeReason::Continue);
    session.finish().unwrap();
    assert_eq!(session.debugger.resume_reason().unwrap(), ResumeReason::Unset);
}

#[tokio::test]
async fn test_quit_emits_no_further_suspensions() {
    let mut session = Session::new(
        DebuggerConfig::new().suspend_on_startup(true),
        nested_program(),
    );
    // Would stop again if the run continued
    session
        .debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 20))
        .unwrap();
    session.start();
    session.suspended().await;

    session.debugger.quit().unwrap();
    assert_eq!(session.finish().unwrap(), RunOutcome::Aborted);

    let mut remaining = Vec::new();
    while let Some(event) = session.events.try_recv_event().await {
        remaining.push(event);
    }
    assert!(remaining
        .iter()
        .all(|e| !matches!(e, DebugEvent::Suspended { .. } | DebugEvent::Resumed { .. })));
    assert!(matches!(
        remaining.last(),
        Some(DebugEvent::Terminated {
            outcome: RunOutcome::Aborted,
            ..
        })
    ));
}

#[tokio::test]
async fn test_only_first_directive_is_accepted() {
    let mut session = Session::new(
        DebuggerConfig::new().suspend_on_startup(true),
        nested_program(),
    );
    session.start();
    session.suspended().await;

    session.debugger.step_continue().unwrap();
    // Either rejected for this suspension or, once resumed, for having none
    assert!(matches!(
        session.debugger.step_into(),
        Err(DebugError::NotSuspended(_))
    ));
    assert_eq!(session.finish().unwrap(), RunOutcome::Completed);
}

#[tokio::test]
async fn test_hit_count_and_condition() {
    let program = serde_json::json!({
        "body": [
            { "line": 1, "call": "tick" },
            { "line": 2, "call": "tick" },
            { "line": 3, "call": "tick" },
            { "line": 4 }
        ],
        "globals": { "n": 0 },
        "functions": {
            "tick": { "body": [ { "line": 8, "global": "n", "value": 1 }, { "line": 9 } ] }
        }
    });
    let mut session = Session::new(DebuggerConfig::default(), program);
    let debugger = session.debugger.clone();

    // Skip the first pass over line 8
    debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 8).with_hit_count(1))
        .unwrap();
    // Replacing keeps exactly one spec
    debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 8).with_hit_count(2))
        .unwrap();
    assert_eq!(debugger.breakpoints().unwrap().len(), 1);
    assert_eq!(
        debugger
            .get_breakpoint(&session.script, 8)
            .unwrap()
            .unwrap()
            .hit_count,
        2
    );
    debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 4).with_condition("n == 1"))
        .unwrap();
    session.start();

    // Third call is the first that stops
    let stack = session.suspended().await;
    assert_eq!(stack[0].line, 8);
    assert_eq!(stack[1].line, 3);

    debugger.step_continue().unwrap();
    let stack = session.suspended().await;
    assert_eq!(stack[0].line, 4);

    debugger.step_continue().unwrap();
    session.finish().unwrap();

    debugger.clear_breakpoint(&session.script, 8).unwrap();
    assert_eq!(debugger.get_breakpoint(&session.script, 8).unwrap(), None);
}

#[tokio::test]
async fn test_temporary_breakpoint_fires_once() {
    let program = serde_json::json!({
        "body": [
            { "line": 1, "call": "f" },
            { "line": 2, "call": "f" },
            { "line": 3 }
        ],
        "functions": { "f": { "body": [ { "line": 6 } ] } }
    });
    let mut session = Session::new(DebuggerConfig::default(), program);
    session
        .debugger
        .set_breakpoint(BreakpointSpec::new(&session.script, 6).temporary())
        .unwrap();
    session.start();

    let stack = session.suspended().await;
    assert_eq!(stack[1].line, 1);
    assert!(session.debugger.breakpoints().unwrap().is_empty());

    session.debugger.step_continue().unwrap();
    assert_eq!(session.finish().unwrap(), RunOutcome::Completed);
}
