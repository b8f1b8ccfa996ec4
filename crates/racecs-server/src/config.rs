//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::websocket::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;

/// Configuration for the dashboard server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Keep-alive ping period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Outbound frames buffered per client before new ones are dropped.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// [`ServerConfig::heartbeat_interval_ms`] as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// `host:port`, as passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_ms: u64::try_from(DEFAULT_HEARTBEAT_INTERVAL.as_millis())
                .unwrap_or(10_000),
            send_queue_capacity: 256,
        }
    }
}
