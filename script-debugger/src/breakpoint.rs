// Breakpoint table
//
// At most one breakpoint per (file, line). Hit processing follows the
// ignore-count / condition / temporary rules of line debuggers.

use crate::error::{DebugError, DebugResult};
use crate::frame::HostFrame;
use crate::types::BreakpointSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type BreakpointKey = (PathBuf, u32);

#[derive(Debug, Clone)]
struct Breakpoint {
    spec: BreakpointSpec,
    hits: u32,
    ignore: u32,
}

#[derive(Debug, Default)]
pub struct BreakpointTable {
    breakpoints: HashMap<BreakpointKey, Breakpoint>,
    consumed: Vec<BreakpointSpec>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `spec`, replacing whatever was at the same location.
    pub fn set(&mut self, spec: BreakpointSpec) -> DebugResult<()> {
        if spec.line < 1 {
            return Err(DebugError::InvalidArgument(format!(
                "breakpoint line must be positive, got {}",
                spec.line
            )));
        }

        self.clear(&spec.file, spec.line);

        info!(
            "Breakpoint set at {}:{} (ignore {} hits)",
            spec.file.display(),
            spec.line,
            spec.hit_count
        );
        let key = (spec.file.clone(), spec.line);
        let ignore = spec.hit_count;
        self.breakpoints.insert(
            key,
            Breakpoint {
                spec,
                hits: 0,
                ignore,
            },
        );
        Ok(())
    }

    /// Same effect as `set`; kept separate for callers that track edits.
    pub fn update(&mut self, spec: BreakpointSpec) -> DebugResult<()> {
        self.set(spec)
    }

    pub fn clear(&mut self, file: &Path, line: u32) -> Option<BreakpointSpec> {
        let removed = self.breakpoints.remove(&(file.to_path_buf(), line));
        if removed.is_some() {
            debug!("Breakpoint removed from {}:{}", file.display(), line);
        }
        removed.map(|bp| bp.spec)
    }

    pub fn clear_file(&mut self, file: &Path) -> usize {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|(path, _), _| path != file);
        before - self.breakpoints.len()
    }

    pub fn get(&self, file: &Path, line: u32) -> Option<&BreakpointSpec> {
        self.breakpoints
            .get(&(file.to_path_buf(), line))
            .map(|bp| &bp.spec)
    }

    /// Times the breakpoint at this location was reached.
    pub fn hits(&self, file: &Path, line: u32) -> Option<u32> {
        self.breakpoints
            .get(&(file.to_path_buf(), line))
            .map(|bp| bp.hits)
    }

    /// All breakpoints ordered by file, then line.
    pub fn list(&self) -> Vec<BreakpointSpec> {
        let mut specs: Vec<_> = self.breakpoints.values().map(|bp| bp.spec.clone()).collect();
        specs.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        specs
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Make the breakpoints of `file` match `specs`.
    ///
    /// Unchanged specs keep their hit and ignore counters. Returns the number
    /// of breakpoints installed or replaced.
    pub fn sync(&mut self, file: &Path, specs: Vec<BreakpointSpec>) -> usize {
        let wanted: HashMap<BreakpointKey, BreakpointSpec> = specs
            .into_iter()
            .filter(|spec| spec.file == file)
            .map(|spec| ((spec.file.clone(), spec.line), spec))
            .collect();

        self.breakpoints.retain(|key, bp| {
            key.0 != file || wanted.get(key).is_some_and(|spec| *spec == bp.spec)
        });

        let mut installed = 0;
        for (key, spec) in wanted {
            if self.breakpoints.contains_key(&key) {
                continue;
            }
            match self.set(spec) {
                Ok(()) => installed += 1,
                Err(e) => warn!("Skipping breakpoint {}:{}: {}", file.display(), key.1, e),
            }
        }
        installed
    }

    /// Temporary breakpoints removed by a stop since the last call.
    pub fn take_consumed(&mut self) -> Vec<BreakpointSpec> {
        std::mem::take(&mut self.consumed)
    }

    /// Count a hit at the frame's location and decide whether to stop there.
    pub fn should_break(&mut self, frame: &dyn HostFrame) -> bool {
        let key = (frame.file().to_path_buf(), frame.line());
        let Some(bp) = self.breakpoints.get_mut(&key) else {
            return false;
        };

        bp.hits += 1;

        if let Some(condition) = &bp.spec.condition {
            match frame.evaluate_condition(condition) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!("Condition {:?} failed ({}), stopping anyway", condition, e);
                    return true;
                }
            }
        }

        if bp.ignore > 0 {
            bp.ignore -= 1;
            debug!(
                "Ignoring breakpoint at {}:{} ({} ignores left)",
                key.0.display(),
                key.1,
                bp.ignore
            );
            return false;
        }

        if bp.spec.temporary {
            debug!("Removing temporary breakpoint at {}:{}", key.0.display(), key.1);
            if let Some(bp) = self.breakpoints.remove(&key) {
                self.consumed.push(bp.spec);
            }
        }

        true
    }
}
