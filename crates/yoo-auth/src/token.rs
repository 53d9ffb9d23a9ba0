//! HS256 token issuance and verification.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::claims::{AuthenticatedUser, Claims, UserId};
use crate::errors::AuthError;

/// Default access token lifetime (1 hour).
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(60 * 60);

/// Default refresh token lifetime (6 × 30 days).
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(6 * 30 * 24 * 60 * 60);

/// An access/refresh token pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived token presented on every request.
    pub access_token: String,
    /// Long-lived token used to obtain a new pair.
    pub refresh_token: String,
}

/// Signs and verifies tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer for `secret` with the given token lifetimes.
    pub fn new(secret: &SecretString, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);
        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create an issuer with the default lifetimes.
    pub fn with_defaults(secret: &SecretString) -> Self {
        Self::new(secret, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL)
    }

    /// Access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a token for `user_id` that expires after `ttl`.
    pub fn issue(&self, user_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let user_id = UserId::new(user_id)?;
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        self.encode_claims(&claims)
    }

    /// Issue an access token.
    pub fn issue_access(&self, user_id: &str) -> Result<String, AuthError> {
        self.issue(user_id, self.access_ttl)
    }

    /// Issue a refresh token.
    pub fn issue_refresh(&self, user_id: &str) -> Result<String, AuthError> {
        self.issue(user_id, self.refresh_ttl)
    }

    /// Issue a fresh access/refresh pair.
    pub fn issue_pair(&self, user_id: &str) -> Result<TokenPair, AuthError> {
        let access_token = self.issue_access(user_id)?;
        let refresh_token = self.issue_refresh(user_id)?;
        debug!(user_id, "issued token pair");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Sign arbitrary claims with this issuer's key.
    ///
    /// Verification still enforces the [`Claims`] shape, so this is mostly
    /// useful for minting tokens with explicit timestamps.
    pub fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify a token and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?;
        AuthenticatedUser::from_claims(data.claims)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::InvalidClaims(format!("missing required claim `{claim}`"))
        }
        ErrorKind::Json(e) => AuthError::InvalidClaims(e.to_string()),
        _ => AuthError::InvalidToken(err.to_string()),
    }
}
