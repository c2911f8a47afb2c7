//! TOML-based configuration.
//!
//! Supports a config file with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [host]
//! prefix = "${WARREN_DATA_DIR}/"
//!
//! [client]
//! timeout_secs = 30
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-request timeout on the controller side (seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker-side host configuration.
    pub host: HostSettings,

    /// Controller-side client configuration.
    pub client: ClientSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(contents)?)
    }
}

/// Host configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HostSettings {
    /// Prefix prepended to database names before the opener runs
    /// (supports ${ENV_VAR} expansion).
    pub prefix: Option<String>,
}

impl HostSettings {
    /// Get the name prefix with environment variables expanded.
    pub fn resolved_prefix(&self) -> Result<Option<String>, SettingsError> {
        self.prefix.as_deref().map(expand_env_vars).transpose()
    }
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Expand `${VAR}` and `$VAR` references from the environment.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(ch);
                    chars.next();
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                // $VAR (ends at non-alphanumeric/underscore)
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    // just a lone $, keep it
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
