//! TOML Configuration File Support
//!
//! Centralized configuration loading for the Conductor, supporting a TOML
//! file at `~/.config/chat-conductor/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`CHAT_CONDUCTOR_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [completion]
//! api_url = "https://api.cerebras.ai/v1/chat/completions"
//! default_model = "llama-3.3-70b"
//! api_keys = ["csk-first", "csk-second"]
//! request_timeout_secs = 120
//!
//! [search]
//! brave_api_keys = ["BSA-one", "BSA-two"]
//! result_count = 20
//! source_timeout_ms = 8000
//! default_sources = ["brave", "wikipedia"]
//!
//! [retry]
//! initial_backoff_ms = 0
//!
//! [session]
//! history_window = 10
//! custom_instructions = "Answer in British English."
//! ```
//!
//! List-valued environment variables are comma-separated.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DEFAULT_API_URL;
use crate::retry::RetryPolicy;
use crate::search::{BRAVE_TAG, DEFAULT_BRAVE_URL, DEFAULT_WIKIPEDIA_URL, WIKIPEDIA_TAG};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CHAT_CONDUCTOR_";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration or building from it
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

    /// A provider has no usable API keys
    #[error("No API keys configured for {provider}")]
    EmptyCredentials {
        /// Provider name
        provider: String,
    },

    /// HTTP client construction failed
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
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

/// Completion section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionToml {
    /// Chat completions endpoint
    pub api_url: Option<String>,

    /// Model used when a request names none
    pub default_model: Option<String>,

    /// API keys in rotation order
    pub api_keys: Option<Vec<String>>,

    /// Whole-request timeout in seconds (includes streaming)
    pub request_timeout_secs: Option<u64>,
}

/// Search section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchToml {
    /// Brave web search endpoint
    pub brave_url: Option<String>,

    /// Brave API keys in rotation order
    pub brave_api_keys: Option<Vec<String>>,

    /// MediaWiki API endpoint
    pub wikipedia_url: Option<String>,

    /// Result count hint sent to every source
    pub result_count: Option<usize>,

    /// Per-source timeout in milliseconds
    pub source_timeout_ms: Option<u64>,

    /// Sources used when search is enabled
    pub default_sources: Option<Vec<String>>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Transcript messages fed to the model
    pub history_window: Option<usize>,

    /// Instructions appended to every system prompt
    pub custom_instructions: Option<String>,

    /// Capacity of the event channel
    pub event_buffer: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Completion provider section
    pub completion: CompletionToml,

    /// Search section
    pub search: SearchToml,

    /// Retry/backoff section (same shape as [`RetryPolicy`])
    pub retry: Option<RetryPolicy>,

    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Completion provider settings
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionSettings {
    /// Chat completions endpoint
    pub api_url: String,
    /// Model used when a request names none
    pub default_model: String,
    /// API keys in rotation order
    pub api_keys: Vec<String>,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            default_model: "llama-3.3-70b".to_string(),
            api_keys: Vec::new(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Search settings
#[derive(Clone, Debug, PartialEq)]
pub struct SearchSettings {
    /// Brave web search endpoint
    pub brave_url: String,
    /// Brave API keys in rotation order (empty = Brave disabled)
    pub brave_api_keys: Vec<String>,
    /// MediaWiki API endpoint
    pub wikipedia_url: String,
    /// Result count hint
    pub result_count: usize,
    /// Per-source timeout
    pub source_timeout: Duration,
    /// Sources used when search is enabled
    pub default_sources: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            brave_url: DEFAULT_BRAVE_URL.to_string(),
            brave_api_keys: Vec::new(),
            wikipedia_url: DEFAULT_WIKIPEDIA_URL.to_string(),
            result_count: 20,
            source_timeout: Duration::from_secs(8),
            default_sources: vec![BRAVE_TAG.to_string(), WIKIPEDIA_TAG.to_string()],
        }
    }
}

/// Session settings
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    /// Transcript messages fed to the model
    pub history_window: usize,
    /// Instructions appended to every system prompt
    pub custom_instructions: Option<String>,
    /// Capacity of the event channel
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            custom_instructions: None,
            event_buffer: 256,
        }
    }
}

/// Centralized configuration for the Conductor
#[derive(Clone, Debug, Default)]
pub struct ConductorConfig {
    /// Completion provider
    pub completion: CompletionSettings,

    /// Search sources
    pub search: SearchSettings,

    /// Retry backoff
    pub retry: RetryPolicy,

    /// Session behaviour
    pub session: SessionSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl ConductorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would make the Conductor misbehave
    ///
    /// Key lists are checked when credential sets are built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completion.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "completion.api_url must not be empty".into(),
            ));
        }
        if self.completion.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "completion.default_model must not be empty".into(),
            ));
        }
        if self.search.result_count == 0 {
            return Err(ConfigError::ValidationError(
                "search.result_count must be at least 1".into(),
            ));
        }
        if self.session.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "session.event_buffer must be at least 1".into(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_backoff_ms must be >= retry.initial_backoff_ms".into(),
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
/// Returns `$XDG_CONFIG_HOME/chat-conductor/conductor.toml` or
/// `~/.config/chat-conductor/conductor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-conductor").join("conductor.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ConductorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Load configuration with an explicit environment lookup
///
/// `env` receives full variable names (`CHAT_CONDUCTOR_MODEL`, ...).
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<E>(path: Option<PathBuf>, env: E) -> Result<ConductorConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = ConductorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
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

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConductorConfig, toml: &ConductorToml) {
    let completion = &toml.completion;
    if let Some(ref url) = completion.api_url {
        config.completion.api_url.clone_from(url);
    }
    if let Some(ref model) = completion.default_model {
        config.completion.default_model.clone_from(model);
    }
    if let Some(ref keys) = completion.api_keys {
        config.completion.api_keys.clone_from(keys);
    }
    if let Some(secs) = completion.request_timeout_secs {
        config.completion.request_timeout = Duration::from_secs(secs);
    }

    let search = &toml.search;
    if let Some(ref url) = search.brave_url {
        config.search.brave_url.clone_from(url);
    }
    if let Some(ref keys) = search.brave_api_keys {
        config.search.brave_api_keys.clone_from(keys);
    }
    if let Some(ref url) = search.wikipedia_url {
        config.search.wikipedia_url.clone_from(url);
    }
    if let Some(count) = search.result_count {
        config.search.result_count = count;
    }
    if let Some(ms) = search.source_timeout_ms {
        config.search.source_timeout = Duration::from_millis(ms);
    }
    if let Some(ref sources) = search.default_sources {
        config.search.default_sources.clone_from(sources);
    }

    if let Some(ref retry) = toml.retry {
        config.retry = retry.clone();
    }

    let session = &toml.session;
    if let Some(window) = session.history_window {
        config.session.history_window = window;
    }
    if let Some(ref instructions) = session.custom_instructions {
        config.session.custom_instructions = Some(instructions.clone());
    }
    if let Some(buffer) = session.event_buffer {
        config.session.event_buffer = buffer;
    }
}

/// Split a comma-separated list, dropping blank entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Apply environment variable overrides
fn apply_env_config<E>(config: &mut ConductorConfig, env: E)
where
    E: Fn(&str) -> Option<String>,
{
    let var = |name: &str| env(&format!("{ENV_PREFIX}{name}"));
    let mut touched = false;

    if let Some(url) = var("API_URL") {
        config.completion.api_url = url;
        touched = true;
    }
    if let Some(model) = var("MODEL") {
        config.completion.default_model = model;
        touched = true;
    }
    if let Some(keys) = var("API_KEYS") {
        config.completion.api_keys = split_list(&keys);
        touched = true;
    }
    if let Some(secs) = var("REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
        config.completion.request_timeout = Duration::from_secs(secs);
        touched = true;
    }

    if let Some(url) = var("BRAVE_URL") {
        config.search.brave_url = url;
        touched = true;
    }
    if let Some(keys) = var("BRAVE_API_KEYS") {
        config.search.brave_api_keys = split_list(&keys);
        touched = true;
    }
    if let Some(url) = var("WIKIPEDIA_URL") {
        config.search.wikipedia_url = url;
        touched = true;
    }
    if let Some(count) = var("SEARCH_COUNT").and_then(|v| v.parse::<usize>().ok()) {
        config.search.result_count = count;
        touched = true;
    }
    if let Some(ms) = var("SEARCH_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.search.source_timeout = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(sources) = var("SEARCH_SOURCES") {
        config.search.default_sources = split_list(&sources);
        touched = true;
    }

    if let Some(ms) = var("INITIAL_BACKOFF_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.retry.initial_backoff_ms = ms;
        touched = true;
    }

    if let Some(window) = var("HISTORY_WINDOW").and_then(|v| v.parse::<usize>().ok()) {
        config.session.history_window = window;
        touched = true;
    }
    if let Some(instructions) = var("CUSTOM_INSTRUCTIONS") {
        config.session.custom_instructions = Some(instructions);
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Completion endpoint override
    pub api_url: Option<String>,

    /// Default model override
    pub default_model: Option<String>,

    /// Search sources override
    pub search_sources: Option<Vec<String>>,

    /// History window override
    pub history_window: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set completion endpoint override
    #[must_use]
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set search sources override
    #[must_use]
    pub fn with_search_sources(mut self, sources: Vec<String>) -> Self {
        self.search_sources = Some(sources);
        self
    }

    /// Set history window override
    #[must_use]
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = Some(window);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ConductorConfig) {
        if self.api_url.is_some()
            || self.default_model.is_some()
            || self.search_sources.is_some()
            || self.history_window.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.api_url {
            config.completion.api_url.clone_from(url);
        }

        if let Some(ref model) = self.default_model {
            config.completion.default_model.clone_from(model);
        }

        if let Some(ref sources) = self.search_sources {
            config.search.default_sources.clone_from(sources);
        }

        if let Some(window) = self.history_window {
            config.session.history_window = window;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
