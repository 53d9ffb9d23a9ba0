//! Auth error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors raised while authenticating a request or issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header on the request.
    #[error("missing Authorization header")]
    MissingHeader,

    /// Header present but not `Bearer <token>`.
    #[error("invalid Authorization header format")]
    MalformedHeader,

    /// Token could not be parsed, or its signature or algorithm is wrong.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token verified but its claims have an unexpected shape.
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),

    /// Token `exp` is in the past.
    #[error("token has expired")]
    Expired,

    /// Subject claim (or requested user ID) is empty.
    #[error("user ID cannot be empty")]
    EmptySubject,

    /// Signing a new token failed.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl AuthError {
    /// HTTP status reported to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHeader | Self::MalformedHeader | Self::InvalidToken(_) | Self::Expired => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidClaims(_) | Self::EmptySubject => StatusCode::BAD_REQUEST,
            Self::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable label, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::InvalidToken(_) => "invalid_token",
            Self::InvalidClaims(_) => "invalid_claims",
            Self::Expired => "expired",
            Self::EmptySubject => "empty_subject",
            Self::Signing(_) => "signing",
        }
    }
}

/// JSON error envelope: `{"error": "<message>"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
