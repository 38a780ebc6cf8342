// Conditional and hit-count breakpoints with variable edits
//
// Runs a loop-like program unobserved until breakpoints fire, rewrites a
// global while suspended, and prints the resume reasons.

use script_debugger::sim::SimHost;
use script_debugger::{
    event_channel, BreakpointSpec, DebugEvent, Debugger, DebuggerConfig, Value,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("script_debugger=debug")
        .init();

    let dir = tempfile::tempdir()?;
    let program = dir.path().join("watch.json");
    std::fs::write(
        &program,
        serde_json::to_string_pretty(&serde_json::json!({
            "globals": { "mode": "slow" },
            "body": [
                { "line": 1, "call": "tick" },
                { "line": 2, "call": "tick" },
                { "line": 3, "call": "tick" },
                { "line": 4, "set": "final_mode", "from": "mode" },
                { "line": 5 }
            ],
            "functions": {
                "tick": { "body": [ { "line": 9, "set": "t", "value": 1 } ] }
            }
        }))?,
    )?;

    let (bridge, events) = event_channel();
    let debugger = Arc::new(Debugger::new(DebuggerConfig::default(), bridge));

    // Third call only
    debugger.set_breakpoint(BreakpointSpec::new(&program, 9).with_hit_count(2))?;
    debugger.set_breakpoint(BreakpointSpec::new(&program, 5).with_condition("final_mode == \"fast\""))?;

    let runner = {
        let debugger = debugger.clone();
        let program = program.clone();
        std::thread::spawn(move || debugger.run(&program, &mut SimHost::new()))
    };

    while let Some(event) = events.recv_event_timeout(Duration::from_secs(10)).await {
        match event {
            DebugEvent::Suspended { stack, .. } => {
                let frames: Vec<String> = stack
                    .iter()
                    .map(|f| format!("{}@{}", f.function, f.line))
                    .collect();
                println!("Suspended: {}", frames.join(" <- "));

                if debugger.get_variable("mode")? == Some(Value::from("slow")) {
                    println!("  switching mode to fast");
                    debugger.set_variable("mode", Value::from("fast"))?;
                }
                debugger.step_continue()?;
            }
            DebugEvent::Resumed { reason, .. } => {
                println!("Resumed ({}, code {})", reason, reason.code());
            }
            DebugEvent::Terminated { outcome, .. } => {
                println!("Finished: {:?}", outcome);
                break;
            }
            DebugEvent::Started { thread } => println!("Started on thread {}", thread),
        }
    }

    for spec in debugger.breakpoints()? {
        println!("Remaining breakpoint {}:{}", spec.file.display(), spec.line);
    }

    if let Ok(result) = runner.join() {
        result?;
    }
    Ok(())
}
