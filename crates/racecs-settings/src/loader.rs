//! Settings loading: defaults, then the JSON file, then environment overrides.
//!
//! Merge rules for the settings file:
//! - Objects merge recursively, file keys win
//! - Arrays and primitives replace the default outright
//! - `null` in the file keeps the default

use std::path::{Path, PathBuf};

use racecs_logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RaceSettings;

/// Shortest accepted heartbeat period, in milliseconds.
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
/// Longest accepted heartbeat period, in milliseconds.
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 600_000;

/// Default settings file location: `$HOME/.racecs/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".racecs").join("settings.json")
}

/// Load settings from [`settings_path`] with environment overrides.
pub fn load_settings() -> Result<RaceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with environment overrides.
///
/// A missing file yields the defaults. An unreadable or malformed file is an
/// error, as is a merged result that fails [`validate`].
pub fn load_settings_from_path(path: &Path) -> Result<RaceSettings> {
    load_settings_from_path_with(path, |key| std::env::var(key).ok())
}

/// [`load_settings_from_path`] with overrides read through `lookup` instead
/// of the process environment.
pub fn load_settings_from_path_with<F>(path: &Path, lookup: F) -> Result<RaceSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(RaceSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RaceSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

/// Recursively merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RACECS_*` overrides read through `lookup`.
///
/// Empty, unparsable, or out-of-range values are ignored with a warning so a
/// typo in the environment never prevents startup.
pub fn apply_overrides<F>(settings: &mut RaceSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = read("RACECS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("RACECS_PORT") {
        match parse_range::<u16>(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "RACECS_PORT", value = %v, "invalid port, ignoring"),
        }
    }
    if let Some(v) = read("RACECS_HEARTBEAT_INTERVAL") {
        match parse_range::<u64>(&v, MIN_HEARTBEAT_INTERVAL_MS, MAX_HEARTBEAT_INTERVAL_MS) {
            Some(ms) => settings.server.heartbeat_interval_ms = ms,
            None => warn!(key = "RACECS_HEARTBEAT_INTERVAL", value = %v, "invalid interval, ignoring"),
        }
    }
    if let Some(v) = read("RACECS_SEND_QUEUE") {
        match parse_range::<usize>(&v, 1, 65_536) {
            Some(capacity) => settings.server.send_queue_capacity = capacity,
            None => warn!(key = "RACECS_SEND_QUEUE", value = %v, "invalid queue capacity, ignoring"),
        }
    }
    if let Some(v) = read("RACECS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("RACECS_LOG_FORMAT") {
        match v.parse::<LogFormat>() {
            Ok(format) => settings.logging.format = format,
            Err(e) => warn!(key = "RACECS_LOG_FORMAT", error = %e, "ignoring"),
        }
    }
}

/// Reject settings the server cannot run with.
///
/// The heartbeat period must lie in
/// [`MIN_HEARTBEAT_INTERVAL_MS`]`..=`[`MAX_HEARTBEAT_INTERVAL_MS`], the same
/// range the `RACECS_HEARTBEAT_INTERVAL` override accepts.
pub fn validate(settings: &RaceSettings) -> Result<()> {
    let heartbeat = settings.server.heartbeat_interval_ms;
    if !(MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS).contains(&heartbeat) {
        return Err(SettingsError::InvalidValue(format!(
            "server.heartbeatIntervalMs must be between {MIN_HEARTBEAT_INTERVAL_MS} and {MAX_HEARTBEAT_INTERVAL_MS}, got {heartbeat}"
        )));
    }
    if settings.server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueCapacity must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Parse `val` and accept it only within `min..=max`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
