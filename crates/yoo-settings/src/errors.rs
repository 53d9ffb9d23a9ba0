//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
///
/// All of these are fatal at startup; none is recoverable at request time.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A configuration source could not be read or did not match the schema.
    #[error("failed to load settings: {0}")]
    Figment(#[from] Box<figment::Error>),
    /// No token signing secret was supplied.
    #[error("JWT signing secret is not configured (set {env})", env = crate::loader::SECRET_ENV)]
    MissingSecret,
    /// A settings value was invalid (e.g., zero interval).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
