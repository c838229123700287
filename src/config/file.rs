//! TOML configuration file loading
//!
//! Reads `~/.config/pyspa/config.toml`. Any key may be left out; missing keys
//! keep their built-in values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Assistant conversation settings
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// OAuth2 flow settings
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// `[assistant]` table
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Path to the OAuth2 client credential JSON
    pub credentials: Option<PathBuf>,

    /// BCP-47 language code (e.g. "ja-JP")
    pub language_code: Option<String>,

    /// Answer used when the service returns no display text
    pub fallback_text: Option<String>,

    /// gRPC endpoint URL
    pub endpoint: Option<String>,

    pub device_id: Option<String>,
    pub device_model_id: Option<String>,

    /// Conversation deadline in seconds
    pub deadline_secs: Option<u64>,

    /// Output volume (0-100)
    pub volume_percent: Option<i32>,

    /// Ask the service for debug info
    pub debug_info: Option<bool>,
}

/// `[auth]` table
#[derive(Debug, Default, Deserialize)]
pub struct AuthFileConfig {
    /// Token cache file
    pub token_cache: Option<PathBuf>,

    /// Loopback redirect URI override
    pub redirect_uri: Option<String>,

    /// Page the browser lands on after the callback
    pub confirmation_url: Option<String>,

    /// How long to wait for the browser callback, in seconds
    pub timeout_secs: Option<u64>,

    /// Delay before the callback listener shuts down, in milliseconds
    pub grace_ms: Option<u64>,

    /// Bound on each token endpoint request, in seconds
    pub exchange_timeout_secs: Option<u64>,

    /// OAuth2 scopes to request
    pub scopes: Option<Vec<String>>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files yield `ConfigFile::default()`.
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/pyspa/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("pyspa").join("config.toml"))
}
