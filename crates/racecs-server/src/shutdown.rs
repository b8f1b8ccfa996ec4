//! Graceful shutdown: stop accepting, let connection tasks close their
//! sessions, then wait for the serve task.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::registry::Registry;

/// Default time allowed for the drain before giving up.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Shared shutdown signal for the listener and every connection task.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, wait for `registry` to empty, then join `handles`.
    ///
    /// Both waits share one `timeout` budget (default 30 s). Tasks still
    /// running afterwards are aborted.
    pub async fn graceful_shutdown(
        &self,
        registry: &Registry,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let deadline = Instant::now() + timeout;

        self.shutdown();
        info!(
            sessions = registry.len(),
            task_count = handles.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "shutting down"
        );

        while !registry.is_empty() {
            if Instant::now() >= deadline {
                warn!(remaining = registry.len(), "sessions still open at shutdown deadline");
                break;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout_at(deadline, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
        } else {
            info!("shutdown complete");
        }
    }
}
