//! Server-side state of one connected dashboard client.
//!
//! A [`Session`] registers itself in a [`Registry`] when created and starts
//! its own keep-alive timer. It leaves the registry only when the transport
//! layer reports the connection closed ([`Session::handle_transport_closed`]),
//! or as a fallback when the last handle to it is dropped.
//!
//! Every outbound send goes through the session's state lock, and close flips
//! the state under that same lock, so nothing is sent once close has been
//! detected.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::heartbeat::HeartbeatHandle;
use super::registry::Registry;
use super::transport::{Transport, TransportError};

/// Opaque connection identifier, `conn_<uuid v7>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registration status of a session.
///
/// `Unregistered -> Registered -> Deregistered`; the last state is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet in the registry.
    Unregistered,
    /// In the registry; heartbeats and broadcasts are delivered.
    Registered,
    /// Transport closed. Nothing more is sent.
    Deregistered,
}

type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// One live client connection.
pub struct Session {
    id: SessionId,
    transport: Box<dyn Transport>,
    registry: Arc<Registry>,
    state: Mutex<SessionState>,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    close_observers: Mutex<Vec<CloseCallback>>,
    closed: CancellationToken,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Session {
    /// Wrap `transport`, start the keep-alive, and join `registry`.
    ///
    /// Must be called from within a Tokio runtime (the heartbeat is a spawned
    /// task).
    pub fn create<T: Transport>(
        transport: T,
        registry: &Arc<Registry>,
        heartbeat_period: Duration,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            id: SessionId::new(),
            transport: Box::new(transport),
            registry: Arc::clone(registry),
            state: Mutex::new(SessionState::Unregistered),
            heartbeat: Mutex::new(None),
            close_observers: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        });

        // The timer only sends while Registered, so starting it first is safe.
        let heartbeat = HeartbeatHandle::spawn(Arc::downgrade(&session), heartbeat_period);
        *session.heartbeat.lock() = Some(heartbeat);

        *session.state.lock() = SessionState::Registered;
        registry.register(&session);

        info!(
            session_id = %session.id,
            heartbeat_ms = u64::try_from(heartbeat_period.as_millis()).unwrap_or(u64::MAX),
            "session opened"
        );
        session
    }

    /// Connection id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current registration status.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session is in the registry and accepting frames.
    pub fn is_registered(&self) -> bool {
        self.state() == SessionState::Registered
    }

    /// Whether the transport close has been handled.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Frames the transport refused (full queue or gone peer).
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Run `callback` once when the transport closes.
    ///
    /// Callbacks run in subscription order. Subscribing after the close has
    /// already been handled runs `callback` immediately on the caller.
    ///
    /// Callbacks run before the session leaves the registry. A broadcast made
    /// from a callback still lists this session but never reaches its
    /// transport.
    pub fn on_closed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let state = self.state.lock();
            if *state != SessionState::Deregistered {
                self.close_observers.lock().push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Resolves once the transport close has been handled.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Close path, driven by the transport layer.
    ///
    /// Stops all further sends, notifies close observers, leaves the registry,
    /// and cancels the keep-alive. Safe to call more than once; only the first
    /// call has any effect.
    pub fn handle_transport_closed(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Deregistered {
                debug!(session_id = %self.id, "close already handled");
                return;
            }
            *state = SessionState::Deregistered;
        }

        let observers = std::mem::take(&mut *self.close_observers.lock());
        for callback in observers {
            callback();
        }
        self.closed.cancel();

        let _ = self.registry.deregister(&self.id);
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            heartbeat.cancel();
        }

        info!(
            session_id = %self.id,
            age_ms = u64::try_from(self.age().as_millis()).unwrap_or(u64::MAX),
            dropped = self.drop_count(),
            "session closed"
        );
    }

    /// Hand one frame to the transport if the session is still registered.
    ///
    /// A session that is not registered reports [`TransportError::Closed`]
    /// without touching the transport. Transport failures are counted in
    /// [`Session::drop_count`].
    pub fn deliver(&self, frame: Arc<String>) -> Result<(), TransportError> {
        let state = self.state.lock();
        if *state != SessionState::Registered {
            return Err(TransportError::Closed);
        }
        let result = self.transport.send(frame);
        drop(state);

        if result.is_err() {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Send one keep-alive frame. Failures are swallowed here; transport
    /// closure is what drives cleanup.
    pub(crate) fn send_heartbeat(&self, frame: Arc<String>) -> bool {
        match self.deliver(frame) {
            Ok(()) => {
                trace!(session_id = %self.id, "heartbeat sent");
                true
            }
            Err(e) => {
                trace!(session_id = %self.id, error = %e, "heartbeat not sent");
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn heartbeat_active(&self) -> bool {
        self.heartbeat
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_cancelled())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.get_mut().take() {
            heartbeat.cancel();
        }
        if *self.state.get_mut() == SessionState::Registered {
            debug!(session_id = %self.id, "session dropped without transport close");
            let _ = self.registry.deregister(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::websocket::heartbeat::HEARTBEAT_FRAME;
    use crate::websocket::testing::RecordingTransport;

    const PERIOD: Duration = Duration::from_secs(10);

    fn open(registry: &Arc<Registry>) -> (Arc<Session>, RecordingTransport) {
        let transport = RecordingTransport::new();
        let session = Session::create(transport.clone(), registry, PERIOD);
        (session, transport)
    }

    #[test]
    fn session_ids_are_unique_and_prefixed() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
        assert_eq!(a.to_string(), a.as_str());
    }

    #[tokio::test]
    async fn create_registers_and_starts_heartbeat() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);

        assert_eq!(session.state(), SessionState::Registered);
        assert!(session.is_registered());
        assert!(!session.is_closed());
        assert!(session.heartbeat_active());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(session.id()));
    }

    #[tokio::test]
    async fn close_deregisters_and_cancels_heartbeat() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);

        session.handle_transport_closed();

        assert_eq!(session.state(), SessionState::Deregistered);
        assert!(session.is_closed());
        assert!(!session.heartbeat_active());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn double_close_is_a_no_op() {
        let registry = Arc::new(Registry::new());
        let (a, _ta) = open(&registry);
        let (_b, _tb) = open(&registry);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        a.on_closed(move || {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        });

        a.handle_transport_closed();
        a.handle_transport_closed();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(a.state(), SessionState::Deregistered);
    }

    #[tokio::test]
    async fn observers_fire_in_subscription_order() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            session.on_closed(move || order.lock().push(i));
        }

        session.handle_transport_closed();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn observer_added_after_close_runs_immediately() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);
        session.handle_transport_closed();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.on_closed(move || {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_future_resolves_on_close() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };

        session.handle_transport_closed();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn deliver_after_close_never_reaches_transport() {
        let registry = Arc::new(Registry::new());
        let (session, transport) = open(&registry);
        session.deliver(Arc::new("before".into())).unwrap();

        session.handle_transport_closed();
        let result = session.deliver(Arc::new("after".into()));

        assert_eq!(result, Err(TransportError::Closed));
        assert_eq!(transport.attempts(), 1);
        assert_eq!(transport.frames(), vec!["before".to_string()]);
    }

    #[tokio::test]
    async fn failed_delivery_is_counted() {
        let registry = Arc::new(Registry::new());
        let (session, transport) = open(&registry);
        transport.set_failing(true);

        assert!(session.deliver(Arc::new("x".into())).is_err());
        assert!(session.deliver(Arc::new("y".into())).is_err());

        assert_eq!(session.drop_count(), 2);
        assert!(session.is_registered(), "send failure must not close the session");
    }

    #[tokio::test]
    async fn heartbeat_failure_is_swallowed() {
        let registry = Arc::new(Registry::new());
        let (session, transport) = open(&registry);
        transport.set_failing(true);

        assert!(!session.send_heartbeat(Arc::new(HEARTBEAT_FRAME.into())));
        assert!(session.is_registered());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn dropping_last_handle_cleans_up() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);
        let id = session.id().clone();

        drop(session);

        assert!(!registry.contains(&id));
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_send_reaches_transport_after_concurrent_close() {
        const SENDERS: usize = 4;

        for _ in 0..100 {
            let registry = Arc::new(Registry::new());
            let transport = RecordingTransport::new();
            let session =
                Session::create(transport.clone(), &registry, Duration::from_millis(1));
            let start = Arc::new(std::sync::Barrier::new(SENDERS + 1));

            let senders: Vec<_> = (0..SENDERS)
                .map(|i| {
                    let session = Arc::clone(&session);
                    let registry = Arc::clone(&registry);
                    let start = Arc::clone(&start);
                    std::thread::spawn(move || {
                        let _ = start.wait();
                        for n in 0..200 {
                            let frame = Arc::new(format!("{i}:{n}"));
                            if i % 2 == 0 {
                                let _ = session.deliver(frame);
                            } else {
                                registry.broadcast_raw(frame);
                            }
                        }
                    })
                })
                .collect();

            let _ = start.wait();
            std::thread::yield_now();
            session.handle_transport_closed();
            let attempts_at_close = transport.attempts();

            for sender in senders {
                sender.join().unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;

            assert_eq!(transport.attempts(), attempts_at_close);
            assert!(registry.is_empty());
            assert_eq!(session.state(), SessionState::Deregistered);
        }
    }

    #[tokio::test]
    async fn n_connects_m_closes_leaves_n_minus_m() {
        let registry = Arc::new(Registry::new());
        let sessions: Vec<_> = (0..7).map(|_| open(&registry).0).collect();
        for session in sessions.iter().take(3) {
            session.handle_transport_closed();
        }
        assert_eq!(registry.len(), 4);
        for session in &sessions {
            session.handle_transport_closed();
        }
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn debug_output_names_session() {
        let registry = Arc::new(Registry::new());
        let (session, _transport) = open(&registry);
        let debug = format!("{session:?}");
        assert!(debug.contains("Session"));
        assert!(debug.contains(session.id().as_str()));
        assert!(debug.contains("Registered"));
    }
}
