//! # replay-settings
//!
//! Configuration for the replay runtime, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`RuntimeSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `REPLAY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, load_settings_with,
};
pub use types::*;
