//! Model descriptors
//!
//! A [`ModelDescriptor`] is the registry's unit of knowledge about one model
//! on one provider. Descriptors are replaced, never edited in place, once
//! they are published in a snapshot.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

// ============================================================================
// Model Key
// ============================================================================

/// Registry key: `(provider, model name)`, rendered as `provider:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    /// Provider name as declared by its adapter
    pub provider: String,
    /// Model name within the provider
    pub name: String,
}

impl ModelKey {
    /// Create a key
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
        }
    }

    /// Parse a `provider:model` id
    ///
    /// Only the first colon separates; model names such as `llama3.2:3b`
    /// keep their own tag.
    pub fn parse(id: &str) -> Result<Self> {
        let (provider, name) = id
            .split_once(':')
            .ok_or_else(|| RouterError::invalid(format!("model id '{id}' is not provider:model")))?;
        let provider = provider.trim();
        let name = name.trim();
        if provider.is_empty() || name.is_empty() {
            return Err(RouterError::invalid(format!(
                "model id '{id}' is not provider:model"
            )));
        }
        Ok(Self::new(provider, name))
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.name)
    }
}

// ============================================================================
// Health and Features
// ============================================================================

/// Last known health of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving normally
    #[default]
    Healthy,
    /// Serving with elevated errors or latency
    Degraded,
    /// Not serving
    Unhealthy,
}

/// Capabilities a model may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFeature {
    /// Plain text completion / chat
    Chat,
    /// Incremental output
    Streaming,
    /// Embedding vectors
    Embeddings,
    /// Tool / function calling
    FunctionCalling,
    /// Image input
    Vision,
    /// Structured JSON output
    JsonMode,
}

// ============================================================================
// Model Descriptor
// ============================================================================

/// Everything the selector needs to know about one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Registry key
    pub key: ModelKey,
    /// Cost per input token (currency units)
    pub cost_per_input_token: f64,
    /// Cost per output token (currency units)
    pub cost_per_output_token: f64,
    /// Average end-to-end latency in milliseconds
    pub avg_latency_ms: u64,
    /// Ordinal quality rating, higher is better
    pub quality: u8,
    /// Context window in tokens
    pub context_window: u32,
    /// Supported features
    pub features: BTreeSet<ModelFeature>,
    /// Whether some adapter can currently serve this model
    pub available: bool,
    /// Last known health
    pub health: HealthStatus,
    /// When health was last checked
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ModelDescriptor {
    /// Create a descriptor with neutral attributes
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ModelKey::new(provider, name),
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            avg_latency_ms: 0,
            quality: 0,
            context_window: 0,
            features: BTreeSet::new(),
            available: true,
            health: HealthStatus::Healthy,
            last_health_check: None,
        }
    }

    /// Set per-token costs
    #[must_use]
    pub fn with_costs(mut self, input: f64, output: f64) -> Self {
        self.cost_per_input_token = input;
        self.cost_per_output_token = output;
        self
    }

    /// Set average latency
    #[must_use]
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.avg_latency_ms = latency_ms;
        self
    }

    /// Set quality rating
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Set context window
    #[must_use]
    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    /// Add a feature
    #[must_use]
    pub fn with_feature(mut self, feature: ModelFeature) -> Self {
        self.features.insert(feature);
        self
    }

    /// Set availability
    #[must_use]
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Set health
    #[must_use]
    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    /// `provider:name`
    #[must_use]
    pub fn id(&self) -> String {
        self.key.to_string()
    }

    /// Provider name
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.key.provider
    }

    /// Model name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Mean of input and output cost, used as the per-token cost in scoring
    #[must_use]
    pub fn blended_cost(&self) -> f64 {
        (self.cost_per_input_token + self.cost_per_output_token) / 2.0
    }

    /// Whether the selector may pick this model
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.available && self.health != HealthStatus::Unhealthy
    }

    /// Whether the model can serve `call` and `stream`
    ///
    /// An empty feature set means the source did not say, and is assumed to
    /// be a chat model. Models advertising features without `Chat` are not.
    #[must_use]
    pub fn generates_text(&self) -> bool {
        self.features.is_empty() || self.features.contains(&ModelFeature::Chat)
    }

    /// Cost of a call with the given token counts
    #[must_use]
    pub fn cost_for(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 * self.cost_per_input_token
            + output_tokens as f64 * self.cost_per_output_token
    }

    /// Fold a later source's view of the same key into this one
    ///
    /// Non-zero numeric attributes from `newer` win; zero means "unknown" and
    /// keeps the older value. Costs move as a pair. Features are unioned.
    /// Availability and health always come from `newer`.
    #[must_use]
    pub fn merged_with(mut self, newer: Self) -> Self {
        let newer_has_costs =
            newer.cost_per_input_token != 0.0 || newer.cost_per_output_token != 0.0;
        if newer_has_costs {
            self.cost_per_input_token = newer.cost_per_input_token;
            self.cost_per_output_token = newer.cost_per_output_token;
        }
        if newer.avg_latency_ms != 0 {
            self.avg_latency_ms = newer.avg_latency_ms;
        }
        if newer.quality != 0 {
            self.quality = newer.quality;
        }
        if newer.context_window != 0 {
            self.context_window = newer.context_window;
        }
        self.features.extend(newer.features);
        self.available = newer.available;
        self.health = newer.health;
        if newer.last_health_check.is_some() {
            self.last_health_check = newer.last_health_check;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_model_key() {
        let key = ModelKey::parse("openai:gpt-4o").unwrap();
        assert_eq!(key, ModelKey::new("openai", "gpt-4o"));
        assert_eq!(key.to_string(), "openai:gpt-4o");

        // Tags after the first colon stay with the model name
        let key = ModelKey::parse("ollama:llama3.2:3b").unwrap();
        assert_eq!(key.name, "llama3.2:3b");
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        for bad in ["gpt-4o", ":gpt-4o", "openai:", "  :  ", ""] {
            let err = ModelKey::parse(bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_REQUEST", "accepted {bad:?}");
        }
    }

    #[test]
    fn test_cost_for() {
        let model = ModelDescriptor::new("openai", "gpt-4o").with_costs(0.5, 2.0);
        assert_eq!(model.cost_for(10, 3), 11.0);
        assert_eq!(model.cost_for(0, 0), 0.0);
    }

    #[test]
    fn test_merge_prefers_known_newer_values() {
        let catalog = ModelDescriptor::new("openai", "gpt-4o")
            .with_costs(2.5e-6, 1e-5)
            .with_latency_ms(1200)
            .with_quality(9)
            .with_context_window(128_000)
            .with_feature(ModelFeature::Chat)
            .with_available(false);

        let discovered = ModelDescriptor::new("openai", "gpt-4o")
            .with_latency_ms(900)
            .with_feature(ModelFeature::Streaming)
            .with_health(HealthStatus::Degraded);

        let merged = catalog.merged_with(discovered);
        assert_eq!(merged.cost_per_input_token, 2.5e-6);
        assert_eq!(merged.cost_per_output_token, 1e-5);
        assert_eq!(merged.avg_latency_ms, 900);
        assert_eq!(merged.quality, 9);
        assert_eq!(merged.context_window, 128_000);
        assert!(merged.features.contains(&ModelFeature::Chat));
        assert!(merged.features.contains(&ModelFeature::Streaming));
        assert!(merged.available);
        assert_eq!(merged.health, HealthStatus::Degraded);
    }

    #[test]
    fn test_unhealthy_is_not_selectable() {
        let model = ModelDescriptor::new("a", "b").with_health(HealthStatus::Unhealthy);
        assert!(!model.is_selectable());
        let model = ModelDescriptor::new("a", "b").with_available(false);
        assert!(!model.is_selectable());
        assert!(ModelDescriptor::new("a", "b").is_selectable());
    }
}
