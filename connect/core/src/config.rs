//! TOML Configuration File Support
//!
//! Loads the chat client configuration from
//! `$XDG_CONFIG_HOME/kca-connect/config.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoint]
//! base_url = "https://abc.supabase.co"
//! api_key = "eyJhbGciOi..."
//! connect_timeout_ms = 5000
//!
//! [session]
//! id = "6f1c2a9e-0000-4000-8000-000000000000"
//! greeting = "Habari! How can I help?"
//! ```
//!
//! # Environment Variables
//!
//! - `KCA_CONNECT_URL`: endpoint base URL
//! - `KCA_CONNECT_API_KEY`: bearer credential
//! - `KCA_CONNECT_SESSION_ID`: conversation ID forwarded with each exchange
//! - `KCA_CONNECT_CONNECT_TIMEOUT_MS`: TCP/TLS connect timeout

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::SessionId;
use crate::transcript::DEFAULT_GREETING;

/// Base URL used when nothing else is configured (local service stack)
pub const DEFAULT_BASE_URL: &str = "http://localhost:54321";

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[endpoint]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// Base URL of the hosted service
    pub base_url: Option<String>,

    /// Bearer credential sent with each exchange
    pub api_key: Option<String>,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Conversation ID on the hosted service
    pub id: Option<String>,

    /// Greeting that opens every transcript
    pub greeting: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Endpoint section
    pub endpoint: EndpointToml,

    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved chat client configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Base URL; exchanges go to `{base_url}/functions/v1/chat`
    pub base_url: String,

    /// Bearer credential
    pub api_key: String,

    /// Conversation ID forwarded as `sessionId`
    pub session_id: Option<SessionId>,

    /// First assistant turn of every transcript
    pub greeting: String,

    /// Connect timeout for the HTTP client
    pub connect_timeout: Duration,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            session_id: None,
            greeting: DEFAULT_GREETING.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source of the highest-priority value applied
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that cannot be caught at parse time
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a base URL that is not
    /// `http`/`https`, or a zero connect timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::ValidationError(format!("base_url {:?}: {e}", self.base_url))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "base_url must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/kca-connect/config.toml` or
/// `~/.config/kca-connect/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("kca-connect").join("config.toml"))
}

/// Load configuration from the default path, then the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error.
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `lookup` in place of the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, lookup: F) -> Result<ChatConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChatConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, lookup);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfig, toml: &ChatToml) {
    if let Some(ref url) = toml.endpoint.base_url {
        config.base_url = url.clone();
    }
    if let Some(ref key) = toml.endpoint.api_key {
        config.api_key = key.clone();
    }
    if let Some(ms) = toml.endpoint.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }

    if let Some(ref id) = toml.session.id {
        config.session_id = Some(SessionId::from(id.as_str()));
    }
    if let Some(ref greeting) = toml.session.greeting {
        config.greeting = greeting.clone();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ChatConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("KCA_CONNECT_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = lookup("KCA_CONNECT_API_KEY") {
        config.api_key = key;
        config.source = ConfigSource::Env;
    }
    if let Some(id) = lookup("KCA_CONNECT_SESSION_ID") {
        config.session_id = Some(SessionId::from(id));
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup("KCA_CONNECT_CONNECT_TIMEOUT_MS") {
        match timeout.parse::<u64>() {
            Ok(ms) => {
                config.connect_timeout = Duration::from_millis(ms);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(
                value = %timeout,
                "Ignoring non-numeric KCA_CONNECT_CONNECT_TIMEOUT_MS"
            ),
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// API key override
    pub api_key: Option<String>,

    /// Session ID override
    pub session_id: Option<String>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set API key override
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set session ID override
    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ChatConfig) {
        if self.base_url.is_some()
            || self.api_key.is_some()
            || self.session_id.is_some()
            || self.connect_timeout_ms.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref key) = self.api_key {
            config.api_key = key.clone();
        }
        if let Some(ref id) = self.session_id {
            config.session_id = Some(SessionId::from(id.as_str()));
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
