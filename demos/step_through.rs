// Step through a small program from its first line
//
// Usage: cargo run -p script-debugger --example step_through [program.json]
// Without an argument a sample program is written to a temp directory.

use script_debugger::sim::SimHost;
use script_debugger::{event_channel, DebugEvent, Debugger, DebuggerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SAMPLE: &str = r#"{
  "globals": { "total": 0 },
  "body": [
    { "line": 1, "set": "count", "value": 3 },
    { "line": 2, "call": "accumulate" },
    { "line": 3, "set": "result", "from": "total" },
    { "line": 4 }
  ],
  "functions": {
    "accumulate": { "body": [
      { "line": 7, "set": "step", "value": 1 },
      { "line": 8, "global": "total", "value": 6 }
    ] }
  }
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("script_debugger=info")
        .init();

    let dir = tempfile::tempdir()?;
    let program = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let path = dir.path().join("sample.json");
            std::fs::write(&path, SAMPLE)?;
            path
        }
    };

    let (bridge, events) = event_channel();
    let debugger = Arc::new(Debugger::new(
        DebuggerConfig::new().suspend_on_startup(true),
        bridge,
    ));

    println!("Debugging {}\n", program.display());
    let runner = {
        let debugger = debugger.clone();
        let program = program.clone();
        std::thread::spawn(move || debugger.run(&program, &mut SimHost::new()))
    };

    while let Some(event) = events.recv_event_timeout(Duration::from_secs(10)).await {
        match event {
            DebugEvent::Suspended { stack, .. } => {
                let Some(top) = stack.first() else {
                    debugger.step_into()?;
                    continue;
                };
                println!("-> {}:{} in {}", top.file.display(), top.line, top.function);
                for (name, value) in &top.locals {
                    println!("     {} = {}", name, value.format());
                }
                debugger.step_into()?;
            }
            DebugEvent::Terminated { outcome, .. } => {
                println!("\nFinished: {:?}", outcome);
                break;
            }
            _ => {}
        }
    }

    match runner.join() {
        Ok(result) => {
            result?;
        }
        Err(_) => eprintln!("debuggee thread panicked"),
    }
    Ok(())
}
