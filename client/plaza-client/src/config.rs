//! Client configuration
//!
//! # Loading Order
//! 1. Built-in defaults (`config/defaults.toml`)
//! 2. Configuration file (if provided and present)
//! 3. Environment variables prefixed `PLAZA_` (highest priority)
//!
//! A `.env` file in the working directory is read before the environment is
//! consulted. Nested keys use `__`, e.g. `PLAZA_IMAGE__MAX_DIMENSION=800`.

use error_types::{ClientError, ClientResult, ValidationError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

const DEFAULTS: &str = include_str!("../config/defaults.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Image transcoding applied before upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct ImageConfig {
    /// Maximum width or height in pixels
    #[validate(range(min = 1))]
    pub max_dimension: u32,
    /// JPEG quality (1-100)
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
    /// Size the transcoder aims to stay under
    #[validate(range(min = 1))]
    pub max_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            quality: 80,
            max_bytes: 200 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClientConfig {
    /// Base URL of the backend REST API
    #[validate(url)]
    pub backend_url: String,

    /// WebSocket base URL; derived from `backend_url` when unset
    #[serde(default)]
    pub ws_url: Option<String>,

    #[validate(range(min = 1))]
    pub feed_page_size: u32,

    #[validate(range(min = 1))]
    pub media_page_size: u32,

    #[validate(range(min = 1))]
    pub suggestions_page_size: u32,

    #[validate(range(min = 1))]
    pub reconnect_delay_ms: u64,

    #[validate(range(min = 1))]
    pub search_debounce_ms: u64,

    /// Queries shorter than this never reach the backend
    pub min_search_len: usize,

    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// File backing the durable key-value store
    pub storage_path: PathBuf,

    #[validate(nested)]
    pub image: ImageConfig,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(config_path: Option<&Path>) -> ClientResult<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults_builder();

        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PLAZA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::build(builder)
    }

    /// Defaults overlaid with an inline TOML document
    pub fn from_toml(toml: &str) -> ClientResult<Self> {
        let builder = Self::defaults_builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn defaults_builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ClientResult<Self> {
        let settings = builder
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to load configuration: {e}")))?;

        let config: ClientConfig = settings
            .try_deserialize()
            .map_err(|e| ClientError::Config(format!("Failed to deserialize configuration: {e}")))?;

        config
            .validate()
            .map_err(|e| ClientError::Validation(ValidationError::from(e)))?;

        Ok(config)
    }

    /// Base URL for the broker WebSocket endpoint
    pub fn ws_base(&self) -> String {
        let base = match &self.ws_url {
            Some(url) => url.clone(),
            None if self.backend_url.starts_with("http") => self.backend_url.replacen("http", "ws", 1),
            None => self.backend_url.clone(),
        };
        base.trim_end_matches('/').to_string()
    }

    pub fn api_base(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            ws_url: None,
            feed_page_size: 3,
            media_page_size: 12,
            suggestions_page_size: 10,
            reconnect_delay_ms: 5000,
            search_debounce_ms: 300,
            min_search_len: 3,
            request_timeout_secs: 30,
            storage_path: PathBuf::from(".plaza/state.json"),
            image: ImageConfig::default(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_builtin_file() {
        let config = ClientConfig::from_toml("").unwrap();
        let builtin = ClientConfig::default();

        assert_eq!(config.feed_page_size, builtin.feed_page_size);
        assert_eq!(config.media_page_size, 12);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.search_debounce(), Duration::from_millis(300));
        assert_eq!(config.image, builtin.image);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_ws_base_derived_from_backend() {
        let config = ClientConfig::from_toml(r#"backend_url = "https://api.plaza.dev/""#).unwrap();
        assert_eq!(config.ws_base(), "wss://api.plaza.dev");
        assert_eq!(config.api_base(), "https://api.plaza.dev");
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let config = ClientConfig::from_toml(
            r#"
            backend_url = "http://localhost:8080"
            ws_url = "ws://broker:15674"
            "#,
        )
        .unwrap();
        assert_eq!(config.ws_base(), "ws://broker:15674");
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = ClientConfig::from_toml("feed_page_size = 0");
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_nested_image_settings_validated() {
        let result = ClientConfig::from_toml("[image]\nmax_dimension = 512\nquality = 0\nmax_bytes = 1");
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }
}
