//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WeatherSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{SourceKind, WeatherSettings};

/// Resolve the path to the settings file (`~/.weatherwatch/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".weatherwatch").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WeatherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<WeatherSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<WeatherSettings> {
    let defaults = serde_json::to_value(WeatherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut WeatherSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] but reading from an arbitrary lookup,
/// so tests do not have to mutate the process environment.
pub fn apply_overrides_from<F>(settings: &mut WeatherSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("WEATHERWATCH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("WEATHERWATCH_PORT").and_then(|v| checked(&v, "WEATHERWATCH_PORT", parse_u16)) {
        settings.server.port = v;
    }
    if let Some(v) = read("WEATHERWATCH_MAX_SEND_QUEUE")
        .and_then(|v| checked(&v, "WEATHERWATCH_MAX_SEND_QUEUE", |s| parse_usize_range(s, 1, 65_536)))
    {
        settings.server.max_send_queue = v;
    }

    // ── Polling ─────────────────────────────────────────────────────
    if let Some(v) = read("WEATHERWATCH_POLL_INTERVAL_MS").and_then(|v| {
        checked(&v, "WEATHERWATCH_POLL_INTERVAL_MS", |s| parse_u64_range(s, 100, 86_400_000))
    }) {
        settings.polling.interval_ms = v;
    }

    // ── Source ──────────────────────────────────────────────────────
    if let Some(v) = read("WEATHERWATCH_SOURCE").and_then(|v| checked(&v, "WEATHERWATCH_SOURCE", parse_source_kind)) {
        settings.source.kind = v;
    }
    if let Some(v) = read("WEATHERWATCH_SOURCE_URL") {
        settings.source.base_url = Some(v);
    }
    if let Some(v) = read("WEATHERWATCH_SOURCE_TIMEOUT_MS").and_then(|v| {
        checked(&v, "WEATHERWATCH_SOURCE_TIMEOUT_MS", |s| parse_u64_range(s, 100, 600_000))
    }) {
        settings.source.request_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("WEATHERWATCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("WEATHERWATCH_LOG_JSON").and_then(|v| checked(&v, "WEATHERWATCH_LOG_JSON", parse_bool)) {
        settings.logging.json = v;
    }
}

fn checked<T>(val: &str, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let result = parse(val);
    if result.is_none() {
        tracing::warn!(key, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a port number. `0` is allowed and means "pick a free port".
pub fn parse_u16(val: &str) -> Option<u16> {
    val.parse().ok()
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_source_kind(val: &str) -> Option<SourceKind> {
    val.parse().ok()
}
