//! Periodic keep-alive pings.
//!
//! The heartbeat is passive: it only sends `{"type":"ping"}` on a fixed
//! period. Missing replies are never counted; the transport's own close
//! detection is what ends a session.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::session::Session;

/// Wire frame sent on every heartbeat tick.
pub const HEARTBEAT_FRAME: &str = r#"{"type":"ping"}"#;

/// Default keep-alive period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The owning session cancelled the timer.
    Cancelled,
    /// The session was dropped before the timer was cancelled.
    SessionGone,
}

/// Send heartbeat frames to `session` every `period` until cancelled.
///
/// The first frame goes out one full period after the call, not immediately.
pub async fn run_heartbeat(
    session: Weak<Session>,
    period: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let period = period.max(MIN_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let frame = Arc::new(HEARTBEAT_FRAME.to_owned());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            _ = ticker.tick() => {
                let Some(session) = session.upgrade() else {
                    debug!("heartbeat stopping, session gone");
                    return HeartbeatResult::SessionGone;
                };
                let _ = session.send_heartbeat(Arc::clone(&frame));
            }
        }
    }
}

/// Running heartbeat task plus the token that stops it.
#[derive(Debug)]
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    task: JoinHandle<HeartbeatResult>,
}

impl HeartbeatHandle {
    /// Spawn [`run_heartbeat`] for `session` on the current runtime.
    pub fn spawn(session: Weak<Session>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(session, period, cancel.clone()));
        Self { cancel, task }
    }

    /// Stop the timer. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`HeartbeatHandle::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
