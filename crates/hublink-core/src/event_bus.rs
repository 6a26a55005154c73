//! Event Bus - distribution of hub events
//!
//! One broadcast channel shared by the capture workflow, the validator and the
//! server integration. The host's server list and any telemetry sink
//! subscribe; a subscriber sees every event emitted after it subscribed.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace, warn};

use crate::HubEvent;

/// Events kept per subscriber before the slowest one starts lagging
const BACKLOG: usize = 64;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BACKLOG);
        Self { tx }
    }

    /// Handle for components that publish
    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishing half. Emitting with nobody listening is fine.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<HubEvent>,
}

impl EventSender {
    pub fn emit(&self, event: HubEvent) {
        let name = event.type_name();
        match self.tx.send(event) {
            Ok(listeners) => debug!(event = name, listeners, "[EventBus] Published"),
            Err(_) => trace!(event = name, "[EventBus] Published with no listeners"),
        }
    }
}

pub struct EventReceiver {
    rx: broadcast::Receiver<HubEvent>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sender is gone.
    /// Events lost to lag are skipped.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "[EventBus] Subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Everything queued right now, oldest first
    pub fn drain(&mut self) -> Vec<HubEvent> {
        let mut queued = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => queued.push(event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "[EventBus] Subscriber fell behind");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return queued,
            }
        }
    }
}
