// Channel-backed event bridge
//
// The debuggee thread pushes events synchronously; the control side awaits
// them through a cloneable handle.

use crate::events::{DebugEvent, EventBridge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sending half, handed to the engine.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    event_tx: mpsc::UnboundedSender<DebugEvent>,
}

impl EventBridge for ChannelBridge {
    fn notify(&self, event: DebugEvent) {
        debug!("Dispatching {:?} event", event_name(&event));
        if self.event_tx.send(event).is_err() {
            warn!("Event receiver dropped, future events will be discarded");
        }
    }
}

/// Handle to the receiving side of an event channel
#[derive(Clone, Debug)]
pub struct EventHandle {
    event_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<DebugEvent>>>,
}

impl EventHandle {
    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<DebugEvent> {
        let mut rx = self.event_rx.lock().await;
        rx.try_recv().ok()
    }

    /// Wait for the next event
    pub async fn recv_event(&self) -> Option<DebugEvent> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    /// Wait for the next event, giving up after `timeout`
    pub async fn recv_event_timeout(&self, timeout: Duration) -> Option<DebugEvent> {
        tokio::time::timeout(timeout, self.recv_event())
            .await
            .ok()
            .flatten()
    }

    /// Drain events until one matches `pred`, giving up after `timeout`.
    /// Non-matching events are dropped.
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> Option<DebugEvent>
    where
        F: Fn(&DebugEvent) -> bool,
    {
        let wait = async {
            while let Some(event) = self.recv_event().await {
                if pred(&event) {
                    return Some(event);
                }
            }
            None
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

/// Create a connected bridge/handle pair.
pub fn event_channel() -> (ChannelBridge, EventHandle) {
    // Unbounded: the debuggee thread must never block on a slow consumer
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        ChannelBridge { event_tx },
        EventHandle {
            event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
        },
    )
}

fn event_name(event: &DebugEvent) -> &'static str {
    match event {
        DebugEvent::Started { .. } => "Started",
        DebugEvent::Suspended { .. } => "Suspended",
        DebugEvent::Resumed { .. } => "Resumed",
        DebugEvent::Terminated { .. } => "Terminated",
    }
}
