// Debugger configuration
//
// Startup behaviour and the optional bound on how long a suspension may wait

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Suspend at the first line of a run instead of running to the first breakpoint.
    pub suspend_on_startup: bool,
    /// Suspend at the first line of every further source file that gets entered.
    pub suspend_on_script_load: bool,
    /// Abort the run if no step directive arrives within this many milliseconds.
    /// `None` waits forever.
    pub suspend_timeout_ms: Option<u64>,
}

impl DebuggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend_on_startup(mut self, suspend: bool) -> Self {
        self.suspend_on_startup = suspend;
        self
    }

    pub fn suspend_on_script_load(mut self, suspend: bool) -> Self {
        self.suspend_on_script_load = suspend;
        self
    }

    pub fn suspend_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.suspend_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.suspend_timeout_ms.map(Duration::from_millis)
    }
}
