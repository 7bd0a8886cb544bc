//! # echomind-settings
//!
//! Configuration for the EchoMind chat gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EchomindSettings::default()`]
//! 2. **Settings file**: `~/.echomind/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `ECHOMIND_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and hands the
//! relevant sections to each component it constructs.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
