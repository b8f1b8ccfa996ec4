//! Test doubles shared by the websocket unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::transport::{Transport, TransportError};

/// Transport that records every send attempt and can be told to fail.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    frames: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Frames accepted so far.
    pub(crate) fn frames(&self) -> Vec<String> {
        self.inner.frames.lock().clone()
    }

    /// Number of accepted frames equal to `frame`.
    pub(crate) fn count_of(&self, frame: &str) -> usize {
        self.inner.frames.lock().iter().filter(|f| *f == frame).count()
    }

    /// Send attempts, including failed ones.
    pub(crate) fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
        let _ = self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner.frames.lock().push((*frame).clone());
        Ok(())
    }
}
