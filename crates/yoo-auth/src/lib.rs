//! # yoo-auth
//!
//! Bearer token authentication for yoo-chat.
//!
//! - [`TokenIssuer`] signs and verifies HS256 tokens with `sub`, `iat`, `exp`
//! - [`extract_bearer_token`] parses `Authorization: Bearer <token>`
//! - [`authenticate`] is the axum middleware that places an
//!   [`AuthenticatedUser`] in request extensions
//!
//! Header and token failures map to 401, claim shape failures to 400.

#![deny(unsafe_code)]

pub mod claims;
pub mod errors;
pub mod header;
pub mod middleware;
pub mod token;

pub use claims::{AuthenticatedUser, Claims, UserId};
pub use errors::{AuthError, ErrorBody};
pub use header::{bearer_from_headers, extract_bearer_token};
pub use middleware::{AUTH_FAILURES_TOTAL, authenticate};
pub use token::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, TokenIssuer, TokenPair};
