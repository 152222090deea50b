//! # weatherwatch-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WeatherSettings::default()`]
//! 2. **User file**: `~/.weatherwatch/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WEATHERWATCH_*` overrides (highest priority)
//!
//! The binary applies command-line flags on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
