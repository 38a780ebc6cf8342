// Debugger error definitions
//
// One error type for every fallible engine operation. Script errors raised by
// the debuggee pass through unchanged inside `DebugError::Script`.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub type DebugResult<T> = Result<T, DebugError>;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("No suspended session: {0}")]
    NotSuspended(&'static str),

    #[error("Run aborted by quit request")]
    Aborted,

    #[error("No step directive received within {0:?}")]
    SuspendTimeout(Duration),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by the debugged script itself.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

impl DebugError {
    /// True for errors that end a run because of the debugger, not the script.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DebugError::LockPoisoned(_) | DebugError::SuspendTimeout(_)
        )
    }
}

/// Acquire `mutex`, turning poisoning into a fatal `LockPoisoned` error.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> DebugResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| DebugError::LockPoisoned(name))
}
