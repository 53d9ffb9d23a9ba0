//! Server error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use yoo_auth::{AuthError, ErrorBody};

/// Errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// WebSocket upgrade negotiation failed.
    #[error("failed to upgrade to WebSocket: {0}")]
    Upgrade(String),

    /// The authenticated identity was not attached to the request.
    #[error("no user ID found on the authenticated request")]
    MissingIdentity,

    /// Token issuance or verification failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ServerError {
    /// HTTP status reported to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(err) => err.status_code(),
            Self::Bind { .. } | Self::Upgrade(_) | Self::MissingIdentity => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err) => err.into_response(),
            other => {
                let body = ErrorBody {
                    error: other.to_string(),
                };
                (other.status_code(), Json(body)).into_response()
            }
        }
    }
}

/// Errors on a single connection's transport. Never escapes the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),
    /// Closing the transport failed.
    #[error("close failed: {0}")]
    Close(String),
    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),
    /// A write did not complete in time.
    #[error("send timed out")]
    Timeout,
}

/// Misuse of the client pool. Logged by the caller, never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Release attempted while the client is connected or registered.
    #[error("client in slot {slot} is still connected")]
    StillConnected {
        /// Pool slot.
        slot: usize,
    },
    /// Slot is already on the free-list.
    #[error("client in slot {slot} was already released")]
    AlreadyFree {
        /// Pool slot.
        slot: usize,
    },
    /// Client does not belong to this pool.
    #[error("slot {slot} does not belong to this pool")]
    ForeignSlot {
        /// Pool slot.
        slot: usize,
    },
    /// Activation attempted on a client that is not idle.
    #[error("client in slot {slot} is not idle")]
    NotIdle {
        /// Pool slot.
        slot: usize,
    },
}
