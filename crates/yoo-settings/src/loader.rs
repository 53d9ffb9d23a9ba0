//! Layered settings loading.
//!
//! Loading flow (later layers win):
//! 1. Compiled [`YooSettings::default()`]
//! 2. `~/.yoo-chat/settings.json` (or an explicit path), if present
//! 3. `YOO_*` environment variables, with `__` separating sections
//!    (e.g. `YOO_CONNECTION__PING_INTERVAL_MS=2000`)
//! 4. `JWT_SECRET_KEY`, mapped onto `auth.secret`

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::Result;
use crate::types::YooSettings;

/// Environment variable carrying the token signing secret.
pub const SECRET_ENV: &str = "JWT_SECRET_KEY";

/// Prefix for section-level environment overrides.
pub const ENV_PREFIX: &str = "YOO_";

/// Resolve the default settings file path (`~/.yoo-chat/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".yoo-chat").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<YooSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON, or values of
/// the wrong type in any layer, is an error. The result is not validated;
/// callers apply their own overrides first and then call
/// [`YooSettings::validate`].
pub fn load_settings_from_path(path: &Path) -> Result<YooSettings> {
    let figment = file_figment(path).merge(Env::prefixed(ENV_PREFIX).split("__"));
    let figment = with_secret(figment, read_env_string(SECRET_ENV));
    extract(&figment)
}

/// Defaults merged with the JSON file at `path`, when it exists.
pub fn file_figment(path: &Path) -> Figment {
    let figment = Figment::from(Serialized::defaults(YooSettings::default()));
    if path.exists() {
        debug!(?path, "loading settings from file");
        figment.merge(Json::file(path))
    } else {
        debug!(?path, "settings file not found, using defaults");
        figment
    }
}

/// Layer a signing secret over `figment`. `None` leaves it untouched.
pub fn with_secret(figment: Figment, secret: Option<String>) -> Figment {
    match secret {
        Some(secret) => figment.merge(Serialized::default("auth.secret", secret)),
        None => figment,
    }
}

/// Extract typed settings from a configured figment.
pub fn extract(figment: &Figment) -> Result<YooSettings> {
    let settings: YooSettings = figment.extract()?;
    Ok(settings)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
