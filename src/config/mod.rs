//! Configuration module.
//!
//! Handles settings files and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, ClientSettings, HostSettings, Settings, SettingsError};
