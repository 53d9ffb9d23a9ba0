//! # yoo-server
//!
//! Authenticated WebSocket connection lifecycle for yoo-chat.
//!
//! - `GET /yoo-chat`: bearer-authenticated upgrade into a pooled session
//! - Keepalive: server pings, missed-pong windows, forced disconnect
//! - Idempotent disconnect shared by the send loop, receiver, and monitor
//! - `POST /refreshToken`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ConnectionConfig, ServerConfig};
pub use error::{PoolError, ServerError, TransportError};
pub use server::{AppState, YooServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::client::DisconnectReason;
pub use websocket::producer::{InboundPayload, MessageProducer, NoopProducer, ProducerError};
