//! Configuration management
//!
//! Values resolve as env > toml > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use self::file::ConfigFile;
use crate::audio::{CHUNK_FRAMES, SAMPLE_RATE_HZ};

/// Default gRPC endpoint of the embedded assistant service
pub const DEFAULT_ENDPOINT: &str = "https://embeddedassistant.googleapis.com";

/// OAuth2 scope required by the assistant service
pub const ASSISTANT_SCOPE: &str = "https://www.googleapis.com/auth/assistant-sdk-prototype";

/// Answer returned when the service produced no display text
pub const DEFAULT_FALLBACK_TEXT: &str = "お役に立てそうもありません";

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Conversation settings
    pub assistant: AssistantConfig,

    /// OAuth2 flow settings
    pub auth: AuthConfig,
}

/// Conversation settings
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Path to the OAuth2 client credential JSON
    pub credentials: Option<PathBuf>,

    /// BCP-47 language code sent with each query
    pub language_code: String,

    /// Answer used when the service returns no display text
    pub fallback_text: String,

    /// gRPC endpoint URL
    pub endpoint: String,

    /// Device identity reported to the service
    pub device_id: String,
    pub device_model_id: String,

    /// Absolute time budget for one conversation
    pub deadline: Duration,

    /// Output volume (0-100)
    pub volume_percent: i32,

    /// Ask the service for debug info
    pub return_debug_info: bool,

    /// Output sample rate requested from the service
    pub sample_rate_hz: u32,

    /// Frames per device write burst
    pub chunk_frames: usize,
}

/// OAuth2 flow settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token cache file
    pub token_cache: PathBuf,

    /// Loopback redirect URI override
    pub redirect_uri: Option<String>,

    /// Page the browser lands on after the callback
    pub confirmation_url: String,

    /// How long to wait for the browser callback
    pub callback_timeout: Duration,

    /// Delay before the callback listener shuts down
    pub shutdown_grace: Duration,

    /// Bound on each token endpoint request
    pub exchange_timeout: Duration,

    /// Scopes to request
    pub scopes: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            language_code: "ja-JP".to_string(),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            device_id: "my-emacs".to_string(),
            device_model_id: "emacs".to_string(),
            deadline: Duration::from_secs(240),
            volume_percent: 100,
            return_debug_info: true,
            sample_rate_hz: SAMPLE_RATE_HZ,
            chunk_frames: CHUNK_FRAMES,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_cache: default_token_cache_path(),
            redirect_uri: None,
            confirmation_url: "https://www.google.com".to_string(),
            callback_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(2),
            exchange_timeout: Duration::from_secs(30),
            scopes: vec![ASSISTANT_SCOPE.to_string()],
        }
    }
}

/// Return the token cache path: `~/.cache/pyspa/oauthToken.cache` on Linux
pub fn default_token_cache_path() -> PathBuf {
    directories::ProjectDirs::from("org", "pyspa", "pyspa").map_or_else(
        || PathBuf::from("oauthToken.cache"),
        |d| d.cache_dir().join("oauthToken.cache"),
    )
}

impl Config {
    /// Load configuration from the environment and `~/.config/pyspa/config.toml`
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge an env lookup over a parsed config file over defaults
    #[must_use]
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AssistantConfig::default();
        let parsed = |key: &str| env(key).and_then(|s| s.parse::<u64>().ok());

        let assistant = AssistantConfig {
            credentials: env("PYSPA_ASSISTANT_CREDENTIALS")
                .map(PathBuf::from)
                .or(fc.assistant.credentials),
            language_code: env("PYSPA_ASSISTANT_LANG")
                .or(fc.assistant.language_code)
                .unwrap_or(defaults.language_code),
            fallback_text: env("PYSPA_ASSISTANT_FALLBACK")
                .or(fc.assistant.fallback_text)
                .unwrap_or(defaults.fallback_text),
            endpoint: env("PYSPA_ASSISTANT_ENDPOINT")
                .or(fc.assistant.endpoint)
                .unwrap_or(defaults.endpoint),
            device_id: env("PYSPA_DEVICE_ID")
                .or(fc.assistant.device_id)
                .unwrap_or(defaults.device_id),
            device_model_id: env("PYSPA_DEVICE_MODEL_ID")
                .or(fc.assistant.device_model_id)
                .unwrap_or(defaults.device_model_id),
            deadline: parsed("PYSPA_ASSISTANT_DEADLINE_SECS")
                .or(fc.assistant.deadline_secs)
                .map_or(defaults.deadline, Duration::from_secs),
            volume_percent: env("PYSPA_ASSISTANT_VOLUME")
                .and_then(|s| s.parse().ok())
                .or(fc.assistant.volume_percent)
                .unwrap_or(defaults.volume_percent)
                .clamp(0, 100),
            return_debug_info: env("PYSPA_ASSISTANT_DEBUG_INFO")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.assistant.debug_info)
                .unwrap_or(defaults.return_debug_info),
            sample_rate_hz: defaults.sample_rate_hz,
            chunk_frames: defaults.chunk_frames,
        };

        let auth_defaults = AuthConfig::default();
        let auth = AuthConfig {
            token_cache: env("PYSPA_TOKEN_CACHE")
                .map(PathBuf::from)
                .or(fc.auth.token_cache)
                .unwrap_or(auth_defaults.token_cache),
            redirect_uri: env("PYSPA_REDIRECT_URI").or(fc.auth.redirect_uri),
            confirmation_url: env("PYSPA_AUTH_CONFIRMATION_URL")
                .or(fc.auth.confirmation_url)
                .unwrap_or(auth_defaults.confirmation_url),
            callback_timeout: parsed("PYSPA_AUTH_TIMEOUT_SECS")
                .or(fc.auth.timeout_secs)
                .map_or(auth_defaults.callback_timeout, Duration::from_secs),
            shutdown_grace: parsed("PYSPA_AUTH_GRACE_MS")
                .or(fc.auth.grace_ms)
                .map_or(auth_defaults.shutdown_grace, Duration::from_millis),
            exchange_timeout: parsed("PYSPA_AUTH_EXCHANGE_TIMEOUT_SECS")
                .or(fc.auth.exchange_timeout_secs)
                .filter(|secs| *secs > 0)
                .map_or(auth_defaults.exchange_timeout, Duration::from_secs),
            scopes: fc
                .auth
                .scopes
                .filter(|s| !s.is_empty())
                .unwrap_or(auth_defaults.scopes),
        };

        Self { assistant, auth }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(ConfigFile::default(), env_from(&[]));

        assert_eq!(config.assistant.language_code, "ja-JP");
        assert_eq!(config.assistant.fallback_text, DEFAULT_FALLBACK_TEXT);
        assert_eq!(config.assistant.deadline, Duration::from_secs(240));
        assert_eq!(config.assistant.sample_rate_hz, 16000);
        assert_eq!(config.assistant.chunk_frames, 400);
        assert!(config.assistant.return_debug_info);
        assert_eq!(config.auth.scopes, vec![ASSISTANT_SCOPE.to_string()]);
        assert_eq!(config.auth.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.auth.exchange_timeout, Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_file() {
        let fc: ConfigFile = toml::from_str(
            r#"
            [assistant]
            language_code = "en-US"
            deadline_secs = 30
            credentials = "/etc/pyspa/file.json"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[
                ("PYSPA_ASSISTANT_LANG", "fr-FR"),
                ("PYSPA_ASSISTANT_CREDENTIALS", "/tmp/env.json"),
                ("PYSPA_AUTH_GRACE_MS", "0"),
                ("PYSPA_AUTH_EXCHANGE_TIMEOUT_SECS", "5"),
            ]),
        );

        assert_eq!(config.assistant.language_code, "fr-FR");
        assert_eq!(config.assistant.deadline, Duration::from_secs(30));
        assert_eq!(
            config.assistant.credentials,
            Some(PathBuf::from("/tmp/env.json"))
        );
        assert_eq!(config.auth.shutdown_grace, Duration::ZERO);
        assert_eq!(config.auth.exchange_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unparsable_numbers_are_ignored() {
        let config = Config::from_sources(
            ConfigFile::default(),
            env_from(&[
                ("PYSPA_ASSISTANT_DEADLINE_SECS", "soon"),
                ("PYSPA_ASSISTANT_VOLUME", "250"),
            ]),
        );

        assert_eq!(config.assistant.deadline, Duration::from_secs(240));
        assert_eq!(config.assistant.volume_percent, 100);
    }
}
