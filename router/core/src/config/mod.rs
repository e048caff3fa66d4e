//! TOML Configuration File Support
//!
//! Centralized configuration loading for the router, from a TOML file at
//! `~/.config/model-router/router.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 500
//! max_delay_ms = 8000
//! backoff_multiplier = 2.0
//!
//! [stream]
//! deadline_secs = 120
//!
//! [selection]
//! decision_log_capacity = 1000
//! local_provider = "ollama"
//!
//! [audit]
//! excerpt_chars = 500
//!
//! [ollama]
//! host = "localhost"
//! port = 11434
//! default_model = "llama3.2"
//!
//! [scenarios.summarize]
//! strategy = "cost"
//! primary_models = ["ollama:llama3.2"]
//! fallback_models = ["openai:gpt-4o-mini"]
//! min_quality = 5
//!
//! [[catalog]]
//! provider = "ollama"
//! name = "qwen2.5"
//! quality = 6
//! avg_latency_ms = 1500
//!
//! [[models]]
//! provider = "ollama"
//! name = "llama3.2"
//! quality = 6
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendRegistry, OllamaAdapter, OLLAMA_PROVIDER};
use crate::collaborators::{StaticConfigStore, StoredModelConfig};
use crate::registry::{ModelDescriptor, ModelFeature, ModelKey, StaticCatalog};
use crate::routing::{
    HardConstraints, RequestRouter, RequestRouterBuilder, RetryConfig, ScenarioCatalog,
    ScenarioProfile, ScoringWeights, SelectionStrategy, DEFAULT_EXCERPT_CHARS,
    DEFAULT_STREAM_DEADLINE,
};

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

// =============================================================================
// Configuration Source Tracking
// =============================================================================

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

/// Retry section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryToml {
    /// Retries after the first attempt
    pub max_retries: Option<u32>,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: Option<u64>,

    /// Upper bound on any delay in milliseconds
    pub max_delay_ms: Option<u64>,

    /// Growth factor per attempt
    pub backoff_multiplier: Option<f64>,

    /// Randomly shorten delays
    pub use_jitter: Option<bool>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Wall-clock budget for a whole stream in seconds
    pub deadline_secs: Option<u64>,
}

/// Selection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionToml {
    /// Selection decisions retained
    pub decision_log_capacity: Option<usize>,

    /// Provider of the always-available local adapter
    pub local_provider: Option<String>,
}

/// Audit section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditToml {
    /// Prompt/response excerpt length in characters
    pub excerpt_chars: Option<usize>,
}

/// Ollama section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaToml {
    /// Server host
    pub host: Option<String>,

    /// Server port
    pub port: Option<u16>,

    /// Model used when nothing else is selectable
    pub default_model: Option<String>,
}

/// One `[scenarios.<id>]` table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioToml {
    /// Selection strategy
    pub strategy: Option<SelectionStrategy>,

    /// Preferred `provider:model` ids
    pub primary_models: Vec<String>,

    /// Ids tried when no primary model is available
    pub fallback_models: Vec<String>,

    /// Weights; the strategy's defaults when absent
    pub weights: Option<ScoringWeights>,

    /// Reject models slower than this
    pub max_latency_ms: Option<u64>,

    /// Reject models with a higher blended per-token cost
    pub max_cost_per_token: Option<f64>,

    /// Reject models rated below this
    pub min_quality: Option<u8>,
}

impl ScenarioToml {
    fn into_profile(self, id: &str) -> ScenarioProfile {
        let strategy = self.strategy.unwrap_or_default();
        let mut profile = ScenarioProfile::new(id, strategy)
            .with_primary(self.primary_models)
            .with_fallback(self.fallback_models)
            .with_constraints(HardConstraints {
                max_latency_ms: self.max_latency_ms,
                max_cost_per_token: self.max_cost_per_token,
                min_quality: self.min_quality,
            });
        if let Some(weights) = self.weights {
            profile = profile.with_weights(weights);
        }
        profile
    }
}

/// One `[[catalog]]` entry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogEntryToml {
    /// Provider name
    pub provider: String,
    /// Model name
    pub name: String,
    /// Cost per input token
    pub cost_per_input_token: f64,
    /// Cost per output token
    pub cost_per_output_token: f64,
    /// Average latency in milliseconds
    pub avg_latency_ms: u64,
    /// Quality rating
    pub quality: u8,
    /// Context window in tokens
    pub context_window: u32,
    /// Supported features
    pub features: Vec<ModelFeature>,
}

impl CatalogEntryToml {
    fn into_descriptor(self) -> ModelDescriptor {
        let mut descriptor = ModelDescriptor::new(self.provider, self.name)
            .with_costs(self.cost_per_input_token, self.cost_per_output_token)
            .with_latency_ms(self.avg_latency_ms)
            .with_quality(self.quality)
            .with_context_window(self.context_window);
        for feature in self.features {
            descriptor = descriptor.with_feature(feature);
        }
        descriptor
    }
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterToml {
    /// Retry section
    pub retry: RetryToml,

    /// Stream section
    pub stream: StreamToml,

    /// Selection section
    pub selection: SelectionToml,

    /// Audit section
    pub audit: AuditToml,

    /// Ollama section
    pub ollama: OllamaToml,

    /// Scenario profiles, added to or replacing the built-ins
    pub scenarios: BTreeMap<String, ScenarioToml>,

    /// Extra static catalog entries
    pub catalog: Vec<CatalogEntryToml>,

    /// Stored model configurations
    pub models: Vec<StoredModelConfig>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the router
///
/// Use [`load_config`] to load configuration with proper priority handling,
/// then [`RouterConfig::router_builder`] to wire a [`RequestRouter`].
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Retry policy
    pub retry: RetryConfig,

    /// Wall-clock budget for a whole stream
    pub stream_deadline: Duration,

    /// Selection decisions retained
    pub decision_log_capacity: usize,

    /// Provider of the always-available local adapter
    pub local_provider: String,

    /// Audit excerpt length in characters
    pub excerpt_chars: usize,

    /// Ollama server host
    pub ollama_host: String,

    /// Ollama server port
    pub ollama_port: u16,

    /// Ollama default model
    pub ollama_default_model: String,

    /// Scenario profiles from the file
    pub scenarios: Vec<ScenarioProfile>,

    /// Extra catalog entries from the file
    pub catalog: Vec<ModelDescriptor>,

    /// Stored model configurations from the file
    pub stored_models: Vec<StoredModelConfig>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            stream_deadline: DEFAULT_STREAM_DEADLINE,
            decision_log_capacity: 1000,
            local_provider: OLLAMA_PROVIDER.to_string(),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            ollama_host: "localhost".to_string(),
            ollama_port: 11434,
            ollama_default_model: "llama3.2".to_string(),
            scenarios: Vec::new(),
            catalog: Vec::new(),
            stored_models: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RouterConfig {
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

    /// Check invariants the router relies on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return invalid(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return invalid(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.initial_delay_ms, self.retry.max_delay_ms
            ));
        }
        if self.stream_deadline.is_zero() {
            return invalid("stream.deadline_secs must be greater than 0".to_string());
        }
        if self.decision_log_capacity == 0 {
            return invalid("selection.decision_log_capacity must be greater than 0".to_string());
        }
        if self.local_provider.trim().is_empty() {
            return invalid("selection.local_provider must not be empty".to_string());
        }

        for profile in &self.scenarios {
            if !profile.weights.is_valid() {
                return invalid(format!(
                    "scenario '{}' has negative or non-finite weights",
                    profile.id
                ));
            }
            for id in profile.primary_models.iter().chain(&profile.fallback_models) {
                if let Err(e) = ModelKey::parse(id) {
                    return invalid(format!("scenario '{}': {}", profile.id, e.message()));
                }
            }
        }

        for entry in &self.catalog {
            if entry.provider().is_empty() || entry.name().is_empty() {
                return invalid("catalog entries need a provider and a name".to_string());
            }
        }

        Ok(())
    }

    /// Built-in scenarios with the file's profiles added or replacing them
    #[must_use]
    pub fn scenario_catalog(&self) -> ScenarioCatalog {
        let mut catalog = ScenarioCatalog::builtin();
        for profile in &self.scenarios {
            catalog.insert(profile.clone());
        }
        catalog
    }

    /// Built-in catalog with the file's entries added or replacing them
    #[must_use]
    pub fn static_catalog(&self) -> StaticCatalog {
        let mut catalog = StaticCatalog::builtin();
        for entry in &self.catalog {
            catalog.insert(entry.clone());
        }
        catalog
    }

    /// Configuration store serving the file's `[[models]]`
    #[must_use]
    pub fn config_store(&self) -> StaticConfigStore {
        StaticConfigStore::new(self.stored_models.clone())
    }

    /// Adapter for the configured Ollama server
    #[must_use]
    pub fn ollama_adapter(&self) -> OllamaAdapter {
        OllamaAdapter::new(
            self.ollama_host.clone(),
            self.ollama_port,
            self.ollama_default_model.clone(),
        )
    }

    /// Router builder wired from this configuration
    ///
    /// Registers the Ollama adapter and designates the local provider.
    /// Further adapters can be registered on `backends` before building.
    #[must_use]
    pub fn router_builder(&self, backends: BackendRegistry) -> RequestRouterBuilder {
        let backends = backends
            .with_adapter(Arc::new(self.ollama_adapter()))
            .with_local_provider(self.local_provider.clone());

        RequestRouter::builder()
            .backends(backends)
            .catalog(self.static_catalog())
            .scenarios(self.scenario_catalog())
            .config_store(Arc::new(self.config_store()))
            .retry(self.retry.clone())
            .stream_deadline(self.stream_deadline)
            .decision_log_capacity(self.decision_log_capacity)
            .excerpt_chars(self.excerpt_chars)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/model-router/router.toml` or
/// `~/.config/model-router/router.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("model-router").join("router.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged configuration is invalid. A missing config file is not an
/// error (defaults are used).
pub fn load_config() -> Result<RouterConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RouterConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with<F>(path: Option<PathBuf>, env: F) -> Result<RouterConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = RouterConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RouterToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
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

    // Environment overrides file values
    apply_env_config_with(&mut config, env);

    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut RouterConfig, toml: RouterToml) {
    let RouterToml {
        retry,
        stream,
        selection,
        audit,
        ollama,
        scenarios,
        catalog,
        models,
    } = toml;

    if let Some(n) = retry.max_retries {
        config.retry.max_retries = n;
    }
    if let Some(ms) = retry.initial_delay_ms {
        config.retry.initial_delay_ms = ms;
    }
    if let Some(ms) = retry.max_delay_ms {
        config.retry.max_delay_ms = ms;
    }
    if let Some(m) = retry.backoff_multiplier {
        config.retry.backoff_multiplier = m;
    }
    if let Some(jitter) = retry.use_jitter {
        config.retry.use_jitter = jitter;
    }

    if let Some(secs) = stream.deadline_secs {
        config.stream_deadline = Duration::from_secs(secs);
    }

    if let Some(capacity) = selection.decision_log_capacity {
        config.decision_log_capacity = capacity;
    }
    if let Some(provider) = selection.local_provider {
        config.local_provider = provider;
    }

    if let Some(chars) = audit.excerpt_chars {
        config.excerpt_chars = chars;
    }

    if let Some(host) = ollama.host {
        config.ollama_host = host;
    }
    if let Some(port) = ollama.port {
        config.ollama_port = port;
    }
    if let Some(model) = ollama.default_model {
        config.ollama_default_model = model;
    }

    config.scenarios = scenarios
        .into_iter()
        .map(|(id, scenario)| scenario.into_profile(&id))
        .collect();
    config.catalog = catalog
        .into_iter()
        .map(CatalogEntryToml::into_descriptor)
        .collect();
    config.stored_models = models;
}

/// Apply environment overrides from the process environment
pub fn apply_env_config(config: &mut RouterConfig) {
    apply_env_config_with(config, |key| std::env::var(key).ok());
}

/// Apply environment overrides from `env`
///
/// Unparsable values are ignored with a warning.
pub fn apply_env_config_with<F>(config: &mut RouterConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
        let parsed = value.trim().parse().ok();
        if parsed.is_none() {
            tracing::warn!(key, value, "Ignoring unparsable environment override");
        }
        parsed
    }

    // Retry settings from environment
    if let Some(n) = env("ROUTER_MAX_RETRIES").and_then(|v| parsed("ROUTER_MAX_RETRIES", &v)) {
        config.retry.max_retries = n;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) =
        env("ROUTER_INITIAL_DELAY_MS").and_then(|v| parsed("ROUTER_INITIAL_DELAY_MS", &v))
    {
        config.retry.initial_delay_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("ROUTER_MAX_DELAY_MS").and_then(|v| parsed("ROUTER_MAX_DELAY_MS", &v)) {
        config.retry.max_delay_ms = ms;
        config.source = ConfigSource::Env;
    }

    // Stream settings from environment
    if let Some(secs) = env("ROUTER_STREAM_DEADLINE_SECS")
        .and_then(|v| parsed::<u64>("ROUTER_STREAM_DEADLINE_SECS", &v))
    {
        config.stream_deadline = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    // Selection settings from environment
    if let Some(provider) = env("ROUTER_LOCAL_PROVIDER") {
        config.local_provider = provider;
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) = env("ROUTER_DECISION_LOG_CAPACITY")
        .and_then(|v| parsed("ROUTER_DECISION_LOG_CAPACITY", &v))
    {
        config.decision_log_capacity = capacity;
        config.source = ConfigSource::Env;
    }

    // Ollama settings from environment
    if let Some(host) = env("OLLAMA_HOST") {
        config.ollama_host = host;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("OLLAMA_PORT").and_then(|v| parsed("OLLAMA_PORT", &v)) {
        config.ollama_port = port;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("OLLAMA_MODEL") {
        config.ollama_default_model = model;
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
    /// Retry count override
    pub max_retries: Option<u32>,

    /// Stream deadline override (seconds)
    pub stream_deadline_secs: Option<u64>,

    /// Ollama host override
    pub ollama_host: Option<String>,

    /// Ollama port override
    pub ollama_port: Option<u16>,

    /// Ollama default model override
    pub ollama_model: Option<String>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry count
    #[must_use]
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Override the stream deadline
    #[must_use]
    pub fn with_stream_deadline_secs(mut self, secs: u64) -> Self {
        self.stream_deadline_secs = Some(secs);
        self
    }

    /// Override the Ollama host
    #[must_use]
    pub fn with_ollama_host(mut self, host: String) -> Self {
        self.ollama_host = Some(host);
        self
    }

    /// Override the Ollama port
    #[must_use]
    pub fn with_ollama_port(mut self, port: u16) -> Self {
        self.ollama_port = Some(port);
        self
    }

    /// Override the Ollama default model
    #[must_use]
    pub fn with_ollama_model(mut self, model: String) -> Self {
        self.ollama_model = Some(model);
        self
    }

    fn is_empty(&self) -> bool {
        self.max_retries.is_none()
            && self.stream_deadline_secs.is_none()
            && self.ollama_host.is_none()
            && self.ollama_port.is_none()
            && self.ollama_model.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut RouterConfig) {
        if self.is_empty() {
            return;
        }
        config.source = ConfigSource::Cli;

        if let Some(n) = self.max_retries {
            config.retry.max_retries = n;
        }
        if let Some(secs) = self.stream_deadline_secs {
            config.stream_deadline = Duration::from_secs(secs);
        }
        if let Some(ref host) = self.ollama_host {
            config.ollama_host.clone_from(host);
        }
        if let Some(port) = self.ollama_port {
            config.ollama_port = port;
        }
        if let Some(ref model) = self.ollama_model {
            config.ollama_default_model.clone_from(model);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
