//! Token claims and the authenticated identity they produce.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

/// Opaque, non-empty user identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a user ID, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Result<Self, AuthError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AuthError::EmptySubject);
        }
        Ok(Self(id))
    }

    /// Borrow the raw ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JWT claims carried by both access and refresh tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// Identity placed in request extensions by the auth middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Verified user ID.
    pub user_id: UserId,
    /// Full verified claims.
    pub claims: Claims,
}

impl AuthenticatedUser {
    /// Build from verified claims. Fails on an empty subject.
    pub fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let user_id = UserId::new(claims.sub.clone())?;
        Ok(Self { user_id, claims })
    }
}
