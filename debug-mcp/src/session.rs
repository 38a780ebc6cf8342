// Debug session management
//
// Owns the debugger engine of each launched script, the debuggee thread
// running it, and the client's breakpoint registry.

use script_debugger::sim::SimHost;
use script_debugger::{
    event_channel, BreakpointProvider, BreakpointSpec, DebugError, DebugEvent, DebugResult,
    Debugger, DebuggerConfig, EventHandle, RunOutcome,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type SessionId = String;

/// Breakpoints requested by the client, independent of any run.
///
/// Doubles as the engine's `BreakpointProvider`, so breakpoints set before
/// launch are installed when their file is entered.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    specs: std::sync::Mutex<BTreeMap<(PathBuf, u32), BreakpointSpec>>,
}

impl BreakpointRegistry {
    fn specs(&self) -> std::sync::MutexGuard<'_, BTreeMap<(PathBuf, u32), BreakpointSpec>> {
        // Plain data; a panicked writer cannot leave it half-updated
        self.specs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns true when an existing breakpoint was replaced.
    pub fn insert(&self, spec: BreakpointSpec) -> bool {
        let key = (spec.file.clone(), spec.line);
        self.specs().insert(key, spec).is_some()
    }

    pub fn remove(&self, file: &Path, line: u32) -> Option<BreakpointSpec> {
        self.specs().remove(&(file.to_path_buf(), line))
    }

    pub fn list(&self) -> Vec<BreakpointSpec> {
        self.specs().values().cloned().collect()
    }
}

impl BreakpointProvider for BreakpointRegistry {
    fn breakpoints_for(&self, file: &Path) -> Vec<BreakpointSpec> {
        self.specs()
            .values()
            .filter(|spec| spec.file == file)
            .cloned()
            .collect()
    }

    fn consumed(&self, spec: &BreakpointSpec) {
        let mut specs = self.specs();
        let key = (spec.file.clone(), spec.line);
        // Leave a breakpoint the client replaced in the meantime
        if specs.get(&key) == Some(spec) {
            specs.remove(&key);
            debug!("Temporary breakpoint {}:{} consumed", spec.file.display(), spec.line);
        }
    }
}

pub struct DebugSession {
    pub id: SessionId,
    pub script: PathBuf,
    pub debugger: Arc<Debugger>,
    pub events: EventHandle,
    pub runner: Option<JoinHandle<DebugResult<RunOutcome>>>,
    pub last_event: Option<DebugEvent>,
    pub outcome: Option<RunOutcome>,
}

impl DebugSession {
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || !self.debugger.is_running()
    }

    /// Record an event received from the engine.
    pub fn observe(&mut self, event: &DebugEvent) {
        if let DebugEvent::Terminated { outcome, .. } = event {
            self.outcome = Some(outcome.clone());
        }
        self.last_event = Some(event.clone());
    }

    /// Wait for the debuggee thread to exit and return its result, rendered
    /// for the client. `None` if it was already collected.
    pub async fn join(&mut self) -> Option<Result<RunOutcome, String>> {
        let runner = self.runner.take()?;
        let result = match tokio::task::spawn_blocking(move || runner.join()).await {
            Ok(Ok(result)) => result.map_err(|e| e.to_string()),
            Ok(Err(_)) => Err("debuggee thread panicked".to_string()),
            Err(e) => Err(format!("failed to join debuggee thread: {}", e)),
        };
        Some(result)
    }
}

pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<Mutex<DebugSession>>>>>,
    current_session: Arc<Mutex<Option<SessionId>>>,
    breakpoints: Arc<BreakpointRegistry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            current_session: Arc::new(Mutex::new(None)),
            breakpoints: Arc::new(BreakpointRegistry::default()),
        }
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    /// Start `script` on a new debuggee thread and make it the current session.
    pub async fn create_session(
        &self,
        script: PathBuf,
        config: DebuggerConfig,
    ) -> DebugResult<SessionId> {
        // Fail here rather than on the debuggee thread
        if script.as_os_str().is_empty() {
            return Err(DebugError::InvalidArgument(
                "script path must not be empty".to_string(),
            ));
        }
        if !script.exists() {
            return Err(DebugError::FileNotFound(script));
        }

        let session_id = format!("session_{}", uuid::v4());
        let (bridge, events) = event_channel();
        let debugger = Arc::new(
            Debugger::new(config, bridge).with_breakpoint_provider(self.breakpoints.clone()),
        );

        let runner = {
            let debugger = debugger.clone();
            let script = script.clone();
            std::thread::Builder::new()
                .name(format!("debuggee-{}", session_id))
                .spawn(move || debugger.run(&script, &mut SimHost::new()))?
        };
        info!("Launched {} as {}", script.display(), session_id);

        let session = DebugSession {
            id: session_id.clone(),
            script,
            debugger,
            events,
            runner: Some(runner),
            last_event: None,
            outcome: None,
        };

        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));

        // Set as current session
        let mut current = self.current_session.lock().await;
        *current = Some(session_id.clone());

        Ok(session_id)
    }

    pub async fn get_current_session(&self) -> Option<Arc<Mutex<DebugSession>>> {
        let current = self.current_session.lock().await;
        if let Some(session_id) = current.as_ref() {
            let sessions = self.sessions.lock().await;
            sessions.get(session_id).cloned()
        } else {
            None
        }
    }

    pub async fn get_current_session_id(&self) -> Option<SessionId> {
        let current = self.current_session.lock().await;
        current.clone()
    }

    pub async fn remove_session(&self, session_id: &str) {
        self.sessions.lock().await.remove(session_id);
        debug!("Removed {}", session_id);

        // Clear current if it was this session
        let mut current = self.current_session.lock().await;
        if current.as_deref() == Some(session_id) {
            *current = None;
        }
    }
}

mod uuid {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(1);

    pub fn v4() -> String {
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        format!("{:x}{:x}", timestamp, counter)
    }
}
