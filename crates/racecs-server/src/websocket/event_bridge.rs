//! Event bridge: forwards [`DashboardEvent`]s produced by race tracking into
//! the [`Registry`] broadcast.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::registry::Registry;
use crate::events::DashboardEvent;

/// Producer side handed to application code.
pub type EventSender = mpsc::Sender<DashboardEvent>;

/// Bridges application events to connected dashboards.
pub struct EventBridge {
    rx: mpsc::Receiver<DashboardEvent>,
    registry: Arc<Registry>,
}

impl EventBridge {
    /// Create a new event bridge.
    pub fn new(rx: mpsc::Receiver<DashboardEvent>, registry: Arc<Registry>) -> Self {
        Self { rx, registry }
    }

    /// Create a channel for feeding an [`EventBridge`].
    pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<DashboardEvent>) {
        mpsc::channel(capacity.max(1))
    }

    /// Run the bridge loop. Exits when every sender is dropped and returns the
    /// number of events forwarded.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self) -> u64 {
        let mut forwarded = 0_u64;
        while let Some(event) = self.rx.recv().await {
            tracing::debug!(event_type = event.event_type(), "bridging event to dashboards");
            self.registry.broadcast(&event);
            forwarded += 1;
        }
        tracing::info!(forwarded, "event bridge: senders closed, exiting");
        forwarded
    }
}
