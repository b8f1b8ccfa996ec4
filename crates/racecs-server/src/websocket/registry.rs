//! The set of live sessions and the broadcast primitive.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::session::{Session, SessionId, SessionState};
use super::transport::TransportError;

/// Live sessions, keyed by id.
///
/// Entries are non-owning. A session removes itself on transport close, and
/// the registry never keeps a session alive.
pub struct Registry {
    sessions: RwLock<HashMap<SessionId, Weak<Session>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Add `session`. Called by [`Session::create`].
    pub fn register(&self, session: &Arc<Session>) {
        let previous = self
            .sessions
            .write()
            .insert(session.id().clone(), Arc::downgrade(session));
        if previous.is_some() {
            warn!(session_id = %session.id(), "session id registered twice, replacing entry");
        }
    }

    /// Remove the entry for `id`. Returns `false` if there was none.
    pub fn deregister(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if !removed {
            debug!(session_id = %id, "deregister of unknown session");
        }
        removed
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Snapshot of the live sessions.
    ///
    /// The lock is released before this returns, so callers may send, close,
    /// or drop the returned sessions freely.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Serialize `message` once and hand it to every registered session.
    ///
    /// Fire-and-forget. A session whose transport rejects the frame is logged
    /// and skipped; the rest still receive it. A serialization failure sends
    /// nothing.
    pub fn broadcast<T: Serialize + ?Sized>(&self, message: &T) {
        match serde_json::to_string(message) {
            Ok(frame) => self.broadcast_raw(Arc::new(frame)),
            Err(e) => warn!(error = %e, "failed to serialize broadcast message"),
        }
    }

    /// Hand an already serialized frame to every registered session.
    pub fn broadcast_raw(&self, frame: Arc<String>) {
        let recipients = self.sessions();
        debug!(
            recipients = recipients.len(),
            bytes = frame.len(),
            "broadcast to all sessions"
        );
        for session in &recipients {
            match session.deliver(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(TransportError::Closed) if session.state() == SessionState::Deregistered => {
                    debug!(session_id = %session.id(), "skipping closing session");
                }
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "failed to send broadcast to session");
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tracing::Level;

    use super::*;
    use crate::events::DashboardEvent;
    use crate::websocket::testing::RecordingTransport;

    const PERIOD: Duration = Duration::from_secs(10);

    fn open(registry: &Arc<Registry>) -> (Arc<Session>, RecordingTransport) {
        let transport = RecordingTransport::new();
        let session = Session::create(transport.clone(), registry, PERIOD);
        (session, transport)
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.sessions().is_empty());
    }

    #[test]
    fn deregister_unknown_returns_false() {
        let registry = Registry::new();
        assert!(!registry.deregister(&SessionId::new()));
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);

        assert!(registry.deregister(session.id()));
        assert!(!registry.deregister(session.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let registry = Arc::new(Registry::new());
        let opened: Vec<_> = (0..4).map(|_| open(&registry)).collect();

        registry.broadcast(&json!({"type": "stationChange"}));

        for (_, transport) in &opened {
            assert_eq!(transport.frames(), vec![r#"{"type":"stationChange"}"#.to_string()]);
        }
    }

    #[tokio::test]
    async fn closed_session_excluded_from_broadcast() {
        let registry = Arc::new(Registry::new());
        let (a, ta) = open(&registry);
        let (_b, tb) = open(&registry);

        a.handle_transport_closed();
        registry.broadcast(&json!({"type": "event", "x": 1}));

        assert_eq!(ta.attempts(), 0);
        assert_eq!(tb.frames(), vec![r#"{"type":"event","x":1}"#.to_string()]);
    }

    #[tokio::test]
    async fn failing_session_does_not_block_others() {
        let registry = Arc::new(Registry::new());
        let opened: Vec<_> = (0..5).map(|_| open(&registry)).collect();
        opened[2].1.set_failing(true);

        registry.broadcast(&DashboardEvent::StationChange);

        let attempts: usize = opened.iter().map(|(_, t)| t.attempts()).sum();
        assert_eq!(attempts, 5);
        for (i, (_, transport)) in opened.iter().enumerate() {
            let expected = usize::from(i != 2);
            assert_eq!(transport.frames().len(), expected);
        }
        assert_eq!(registry.len(), 5);
    }

    #[tokio::test]
    async fn delivery_failure_is_logged() {
        let (logs, _guard) = racecs_logging::capture_logs();
        let registry = Arc::new(Registry::new());
        let (session, transport) = open(&registry);
        transport.set_failing(true);

        registry.broadcast(&DashboardEvent::StationChange);

        assert!(logs.has_event(Level::WARN, "failed to send broadcast"));
        let warned = logs
            .events()
            .into_iter()
            .find(|e| e.message.contains("failed to send broadcast"))
            .unwrap();
        assert_eq!(warned.field("session_id"), Some(session.id().as_str()));
    }

    #[tokio::test]
    async fn broadcast_from_close_observer_skips_closing_session() {
        let (logs, _guard) = racecs_logging::capture_logs();
        let registry = Arc::new(Registry::new());
        let (a, ta) = open(&registry);
        let (_b, tb) = open(&registry);

        let observer_registry = Arc::clone(&registry);
        a.on_closed(move || {
            observer_registry.broadcast(&DashboardEvent::RemovePlayer { user: "ann".into() });
        });
        a.handle_transport_closed();

        assert_eq!(ta.attempts(), 0);
        assert_eq!(tb.frames(), vec![r#"{"type":"removePlayer","user":"ann"}"#.to_string()]);
        assert!(!logs.has_event(Level::WARN, "failed to send broadcast"));
        assert!(logs.has_event(Level::DEBUG, "skipping closing session"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry_is_a_no_op() {
        let registry = Registry::new();
        registry.broadcast(&DashboardEvent::Ping);
        registry.broadcast_raw(Arc::new("raw".into()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn broadcast_raw_shares_one_frame() {
        let registry = Arc::new(Registry::new());
        let (_a, ta) = open(&registry);
        let (_b, tb) = open(&registry);

        registry.broadcast_raw(Arc::new("hello".into()));

        assert_eq!(ta.frames(), vec!["hello".to_string()]);
        assert_eq!(tb.frames(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn dropped_session_not_in_snapshot() {
        let registry = Arc::new(Registry::new());
        let (a, _ta) = open(&registry);
        let (b, _tb) = open(&registry);
        drop(a);

        let live = registry.sessions();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), b.id());
    }

    #[tokio::test]
    async fn independent_registries_do_not_share_sessions() {
        let first = Arc::new(Registry::new());
        let second = Arc::new(Registry::new());
        let (_a, ta) = open(&first);
        let (_b, tb) = open(&second);

        first.broadcast(&DashboardEvent::StationChange);

        assert_eq!(ta.frames().len(), 1);
        assert!(tb.frames().is_empty());
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn debug_shows_count() {
        let registry = Arc::new(Registry::new());
        let (_a, _ta) = open(&registry);
        assert_eq!(format!("{registry:?}"), "Registry { sessions: 1 }");
    }
}
