//! The send side of a client connection, as seen by a [`Session`].
//!
//! [`Session`]: super::session::Session

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

/// Why a frame could not be handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is gone or the session no longer accepts frames.
    #[error("transport closed")]
    Closed,
    /// The outbound queue is at capacity.
    #[error("transport send queue full")]
    Full,
}

/// A non-blocking, send-capable handle to one client.
pub trait Transport: Send + Sync + 'static {
    /// Queue one serialized frame for the client.
    fn send(&self, frame: Arc<String>) -> Result<(), TransportError>;
}

/// [`Transport`] backed by a bounded channel drained by a socket writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Arc<String>>,
}

impl ChannelTransport {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self { tx }
    }

    /// Create a transport and the receiver its writer task should drain.
    ///
    /// A zero capacity is bumped to one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}
