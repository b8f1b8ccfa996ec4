//! Session lifecycle, keep-alive, and broadcast fan-out.

pub mod event_bridge;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
