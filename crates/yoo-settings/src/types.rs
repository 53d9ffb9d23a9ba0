//! Settings schema with compiled defaults.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use yoo_logging::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YooSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Per-connection keepalive and lifecycle settings.
    pub connection: ConnectionSettings,
    /// Token signing and lifetimes.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl YooSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.update_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.update_interval_ms must be > 0".into(),
            ));
        }
        if c.ping_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.ping_interval_ms must be > 0".into(),
            ));
        }
        if c.max_missed_pongs == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.max_missed_pongs must be > 0".into(),
            ));
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "auth token lifetimes must be > 0".into(),
            ));
        }
        let _ = self.auth.secret()?;
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for tasks to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Per-connection timers and limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Interval of the update tick (payload injection + liveness check).
    pub update_interval_ms: u64,
    /// Interval of ping probes and of the keepalive monitor.
    pub ping_interval_ms: u64,
    /// Consecutive missed pong windows before a forced disconnect.
    pub max_missed_pongs: u32,
    /// How long a finished session waits for its background tasks.
    pub task_join_timeout_ms: u64,
}

impl ConnectionSettings {
    /// Update tick interval.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Ping / keepalive interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Background task join bound.
    pub fn task_join_timeout(&self) -> Duration {
        Duration::from_millis(self.task_join_timeout_ms)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 5_000,
            ping_interval_ms: 5_000,
            max_missed_pongs: 2,
            task_join_timeout_ms: 1_000,
        }
    }
}

/// Token signing settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HMAC secret. Usually injected from `JWT_SECRET_KEY`.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,
}

impl AuthSettings {
    /// The signing secret, or [`SettingsError::MissingSecret`] if unset or empty.
    pub fn secret(&self) -> Result<SecretString> {
        match self.secret.as_deref() {
            Some(s) if !s.trim().is_empty() => Ok(SecretString::from(s.to_owned())),
            _ => Err(SettingsError::MissingSecret),
        }
    }

    /// Access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    /// Refresh token lifetime.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: None,
            access_ttl_secs: 60 * 60,
            refresh_ttl_secs: 6 * 30 * 24 * 60 * 60,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}
