// Debug tools schema definitions
//
// MCP tools for launching and controlling a script debugging session

use crate::protocol::Tool;
use serde_json::{json, Value};

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn no_arguments() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

fn location() -> Value {
    json!({
        "file": {
            "type": "string",
            "description": "Script file path"
        },
        "line": {
            "type": "integer",
            "description": "Line number (1-based)",
            "minimum": 1
        }
    })
}

pub fn get_tools() -> Vec<Tool> {
    let mut breakpoint_properties = location();
    if let Some(properties) = breakpoint_properties.as_object_mut() {
        properties.insert(
            "condition".to_string(),
            json!({
                "type": "string",
                "description": "Stop only when this evaluates true (e.g. 'count == 3')"
            }),
        );
        properties.insert(
            "temporary".to_string(),
            json!({
                "type": "boolean",
                "description": "Remove the breakpoint after it first stops",
                "default": false
            }),
        );
        properties.insert(
            "hit_count".to_string(),
            json!({
                "type": "integer",
                "description": "Number of hits to ignore before stopping",
                "default": 0
            }),
        );
    }

    vec![
        tool(
            "debug.launch",
            "Run a script on a debuggee thread under the debugger",
            json!({
                "type": "object",
                "properties": {
                    "script": {
                        "type": "string",
                        "description": "Path of the program to run"
                    },
                    "stop_on_entry": {
                        "type": "boolean",
                        "description": "Suspend at the first line",
                        "default": false
                    },
                    "stop_on_script_load": {
                        "type": "boolean",
                        "description": "Suspend at the first line of every newly entered file",
                        "default": false
                    },
                    "suspend_timeout_ms": {
                        "type": "integer",
                        "description": "Abort the run if no step command arrives in time (default: wait forever)"
                    }
                },
                "required": ["script"]
            }),
        ),
        tool(
            "debug.set_breakpoint",
            "Set or replace the breakpoint at a file and line",
            json!({
                "type": "object",
                "properties": breakpoint_properties,
                "required": ["file", "line"]
            }),
        ),
        tool(
            "debug.clear_breakpoint",
            "Clear the breakpoint at a file and line",
            json!({
                "type": "object",
                "properties": location(),
                "required": ["file", "line"]
            }),
        ),
        tool(
            "debug.list_breakpoints",
            "List all breakpoints",
            no_arguments(),
        ),
        tool(
            "debug.continue",
            "Resume until the next breakpoint",
            no_arguments(),
        ),
        tool(
            "debug.step_over",
            "Run the current line without stopping in calls it makes",
            no_arguments(),
        ),
        tool(
            "debug.step_into",
            "Stop at the next line executed, entering calls",
            no_arguments(),
        ),
        tool(
            "debug.step_out",
            "Run until the current function returns",
            no_arguments(),
        ),
        tool(
            "debug.terminate",
            "Abort a suspended run and end the session",
            no_arguments(),
        ),
        tool(
            "debug.get_stack",
            "Get the suspended stack with local variables",
            json!({
                "type": "object",
                "properties": {
                    "max_frames": {
                        "type": "integer",
                        "description": "Maximum number of frames to return",
                        "default": 20
                    },
                    "include_variables": {
                        "type": "boolean",
                        "description": "Include local variables in frames",
                        "default": true
                    }
                }
            }),
        ),
        tool(
            "debug.get_variable",
            "Read a variable in the suspended frame (locals shadow globals)",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Variable name"
                    }
                },
                "required": ["name"]
            }),
        ),
        tool(
            "debug.list_variables",
            "List the local variables of the suspended frame",
            no_arguments(),
        ),
        tool(
            "debug.set_variable",
            "Assign a variable in the suspended frame; unknown locals are written as globals",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Variable name"
                    },
                    "value": {
                        "description": "New value as JSON"
                    }
                },
                "required": ["name", "value"]
            }),
        ),
        tool(
            "debug.wait_for_event",
            "Wait for the next debugger event (suspension, resume, termination)",
            json!({
                "type": "object",
                "properties": {
                    "timeout_ms": {
                        "type": "integer",
                        "description": "How long to wait",
                        "default": 5000
                    }
                }
            }),
        ),
        tool(
            "debug.status",
            "Show the current session state",
            no_arguments(),
        ),
    ]
}
