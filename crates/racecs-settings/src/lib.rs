//! # racecs-settings
//!
//! Settings for the RaceCS dashboard server, resolved from three layers
//! (lowest priority first):
//! 1. **Compiled defaults**: [`RaceSettings::default()`]
//! 2. **Settings file**: `~/.racecs/settings.json`, deep-merged over defaults
//! 3. **Environment**: `RACECS_*` variables
//!
//! Command-line flags in the `racecs` binary sit above all three.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    MAX_HEARTBEAT_INTERVAL_MS, MIN_HEARTBEAT_INTERVAL_MS, apply_overrides, deep_merge, load_settings,
    load_settings_from_path, load_settings_from_path_with, settings_path, validate,
};
pub use types::{LoggingSettings, RaceSettings, ServerSettings};
