//! # racecs-server
//!
//! Live fan-out layer of the RaceCS dashboard.
//!
//! - [`websocket::session::Session`]: one connected browser, with its own
//!   keep-alive timer and a close notification
//! - [`websocket::registry::Registry`]: the live session set and the
//!   `broadcast` primitive application code calls on every state change
//! - [`websocket::event_bridge::EventBridge`]: forwards typed
//!   [`events::DashboardEvent`]s from a channel into the registry
//! - [`server::RaceServer`]: Axum front with `/ws` and `/health`
//!
//! Delivery is best-effort: a failed send to one client is logged and never
//! affects the others or the caller.

#![deny(unsafe_code)]

pub mod config;
pub mod events;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use events::DashboardEvent;
pub use server::RaceServer;
pub use websocket::registry::Registry;
pub use websocket::session::{Session, SessionId, SessionState};
pub use websocket::transport::{ChannelTransport, Transport, TransportError};
