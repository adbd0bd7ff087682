//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RuntimeSettings::default()`]
//! 2. If a settings file is given and exists, deep-merge it over defaults
//! 3. Apply `REPLAY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::RuntimeSettings;

/// Env var naming the settings file.
pub const CONFIG_PATH_ENV: &str = "REPLAY_CONFIG";

/// Load settings using the process environment. The file named by
/// `REPLAY_CONFIG` is merged in when set.
pub fn load_settings() -> Result<RuntimeSettings> {
    let path = read_process_env(CONFIG_PATH_ENV).map(PathBuf::from);
    load_settings_with(path.as_deref(), read_process_env)
}

/// Load settings from a specific file with process env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<RuntimeSettings> {
    load_settings_with(Some(path), read_process_env)
}

/// Load settings with an explicit env lookup.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_with<F>(path: Option<&Path>, env: F) -> Result<RuntimeSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(RuntimeSettings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: RuntimeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides.
///
/// Invalid values are ignored with a warning and the file/default value
/// stays in effect.
pub fn apply_env_overrides<F>(settings: &mut RuntimeSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let reader = EnvReader { env: &env };

    // ── App ─────────────────────────────────────────────────────────
    if let Some(v) = reader.string("REPLAY_APP_NAME") {
        settings.app.name = v;
    }
    if let Some(v) = reader.string("REPLAY_APP_HOST") {
        settings.app.host = v;
    }
    if let Some(v) = reader.u16("REPLAY_APP_PORT", 1, 65535) {
        settings.app.port = Some(v);
    }

    // ── Sidecar ─────────────────────────────────────────────────────
    if let Some(v) = reader.string("REPLAY_SIDECAR_API") {
        settings.sidecar.base_url = v;
    }
    if let Some(v) = reader.u64("REPLAY_SIDECAR_TIMEOUT_MS", 100, 3_600_000) {
        settings.sidecar.request_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = reader.string("REPLAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = reader.bool("REPLAY_LOG_JSON") {
        settings.logging.json = v;
    }
}

fn validate(settings: &RuntimeSettings) -> Result<()> {
    if settings.app.port.is_none() && settings.app.port_range_start > settings.app.port_range_end {
        return Err(SettingsError::InvalidValue(format!(
            "port range {}..={} is empty",
            settings.app.port_range_start, settings.app.port_range_end
        )));
    }
    if settings.sidecar.base_url.trim().is_empty() {
        return Err(SettingsError::InvalidValue("sidecar base URL is empty".into()));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

struct EnvReader<'a, F> {
    env: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.env)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.env)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.env)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
