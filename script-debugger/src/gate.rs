// Suspend gate
//
// Single-slot latch the debuggee thread blocks on while the control thread
// decides how to continue.

use crate::error::{lock, DebugError, DebugResult};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Default)]
pub struct SuspendGate {
    latched: Mutex<bool>,
    cvar: Condvar,
}

impl SuspendGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the waiter, or latch the signal until the next wait.
    pub fn signal(&self) -> DebugResult<()> {
        let mut latched = lock(&self.latched, "gate")?;
        *latched = true;
        self.cvar.notify_one();
        Ok(())
    }

    /// Block until signalled, then consume the signal.
    ///
    /// With `timeout = None` this waits forever.
    pub fn wait_for_signal(&self, timeout: Option<Duration>) -> DebugResult<()> {
        let mut latched = lock(&self.latched, "gate")?;
        let deadline = timeout.map(|t| Instant::now() + t);

        while !*latched {
            latched = match deadline {
                None => self
                    .cvar
                    .wait(latched)
                    .map_err(|_| DebugError::LockPoisoned("gate"))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!("Gave up waiting for a step directive after {:?}", timeout);
                        return Err(DebugError::SuspendTimeout(timeout.unwrap_or_default()));
                    }
                    self.cvar
                        .wait_timeout(latched, deadline - now)
                        .map_err(|_| DebugError::LockPoisoned("gate"))?
                        .0
                }
            };
        }

        *latched = false;
        debug!("Suspend gate released");
        Ok(())
    }

    /// Drop a signal nobody waited for.
    pub fn reset(&self) -> DebugResult<()> {
        *lock(&self.latched, "gate")? = false;
        Ok(())
    }
}
