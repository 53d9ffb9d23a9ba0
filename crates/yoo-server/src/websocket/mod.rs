//! WebSocket connection lifecycle.
//!
//! - [`pool::ClientPool`] recycles [`client::Client`] objects across sessions
//! - [`registry::ConnectionRegistry`] tracks every connected client
//! - [`handler::ConnectionHandler`] runs a session: send loop, receiver, keepalive
//! - [`upgrade`] holds the authenticated HTTP entry points

pub mod client;
pub mod handler;
pub mod keepalive;
pub mod pool;
pub mod producer;
pub mod registry;
pub mod transport;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testing;
