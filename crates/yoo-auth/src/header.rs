//! `Authorization` header parsing.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::errors::AuthError;

/// Extract the token from a `Bearer <token>` header value.
///
/// The value must split on a single space into exactly two parts, the first
/// being `Bearer` (case-sensitive).
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Extract the bearer token from request headers.
pub fn bearer_from_headers(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;
    extract_bearer_token(value)
}
