//! # yoo-settings
//!
//! Configuration for the yoo-chat server, loaded from layered sources
//! (in priority order, lowest first):
//! 1. **Compiled defaults**: [`YooSettings::default()`]
//! 2. **User file**: `~/.yoo-chat/settings.json`, or the `--config` path
//! 3. **Environment variables**: `YOO_<SECTION>__<KEY>` overrides
//! 4. **Signing secret**: `JWT_SECRET_KEY`
//!
//! Loading never validates; call [`YooSettings::validate`] once all
//! overrides (including CLI flags) are applied.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{ENV_PREFIX, SECRET_ENV, load_settings, load_settings_from_path, settings_path};
pub use types::*;
