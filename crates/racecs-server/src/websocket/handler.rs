//! Per-connection task: bridges one upgraded WebSocket to a [`Session`].
//!
//! The dashboard protocol is push-only. Inbound text is read and ignored so
//! that close frames and read errors are still noticed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use super::registry::Registry;
use super::session::Session;
use super::transport::ChannelTransport;

/// Per-connection settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Keep-alive period for the session.
    pub heartbeat_interval: Duration,
    /// Bound of the outbound frame queue.
    pub send_queue_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            send_queue_capacity: 256,
        }
    }
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the socket failed.
    ReadError,
    /// Writing a frame to the socket failed.
    WriteFailed,
    /// The server is shutting down.
    ServerShutdown,
}

impl CloseReason {
    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ReadError => "read_error",
            Self::WriteFailed => "write_failed",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drive one client connection until it closes.
///
/// Creates the session (which registers it and starts its heartbeat), runs a
/// writer task draining the session's outbound queue, and reads until the
/// client goes away or `shutdown` fires. The session's close path runs before
/// this returns.
pub async fn run_ws_connection(
    socket: WebSocket,
    registry: Arc<Registry>,
    options: ConnectionOptions,
    shutdown: CancellationToken,
) -> CloseReason {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (transport, mut outbound) = ChannelTransport::channel(options.send_queue_capacity);
    let session = Session::create(transport, &registry, options.heartbeat_interval);

    let writer_id = session.id().clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = ws_tx.send(Message::Text((*frame).clone().into())).await {
                debug!(session_id = %writer_id, error = %e, "websocket write failed");
                return;
            }
        }
        let _ = ws_tx.close().await;
    });

    let reason = loop {
        tokio::select! {
            () = shutdown.cancelled() => break CloseReason::ServerShutdown,
            _ = &mut writer => break CloseReason::WriteFailed,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                Some(Ok(Message::Text(text))) => {
                    trace!(session_id = %session.id(), bytes = text.as_str().len(), "ignoring client text");
                }
                Some(Ok(_)) => {
                    trace!(session_id = %session.id(), "ignoring non-text frame");
                }
                Some(Err(e)) => {
                    debug!(session_id = %session.id(), error = %e, "websocket read failed");
                    break CloseReason::ReadError;
                }
            },
        }
    };

    session.handle_transport_closed();
    writer.abort();

    info!(session_id = %session.id(), reason = %reason, "websocket connection ended");
    reason
}
