//! Configuration Store contract
//!
//! Stored per-model configuration, typically administered outside this
//! process. Only active entries contribute to the registry; the adapter's
//! own model info is authoritative and the stored fields overlay it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::registry::{ModelDescriptor, ModelKey};

/// One stored model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModelConfig {
    /// Provider name
    pub provider: String,
    /// Model name
    pub name: String,
    /// Whether the model should be offered at all
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Override cost per input token
    #[serde(default)]
    pub cost_per_input_token: Option<f64>,
    /// Override cost per output token
    #[serde(default)]
    pub cost_per_output_token: Option<f64>,
    /// Override quality rating
    #[serde(default)]
    pub quality: Option<u8>,
    /// Override average latency
    #[serde(default)]
    pub avg_latency_ms: Option<u64>,
}

fn default_active() -> bool {
    true
}

impl StoredModelConfig {
    /// Active entry with no overrides
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
            is_active: true,
            cost_per_input_token: None,
            cost_per_output_token: None,
            quality: None,
            avg_latency_ms: None,
        }
    }

    /// Mark inactive
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Override quality
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Override costs
    #[must_use]
    pub fn with_costs(mut self, input: f64, output: f64) -> Self {
        self.cost_per_input_token = Some(input);
        self.cost_per_output_token = Some(output);
        self
    }

    /// Registry key for this entry
    #[must_use]
    pub fn key(&self) -> ModelKey {
        ModelKey::new(&self.provider, &self.name)
    }

    /// Apply stored overrides to the adapter's descriptor
    #[must_use]
    pub fn overlay(&self, mut descriptor: ModelDescriptor) -> ModelDescriptor {
        if let Some(cost) = self.cost_per_input_token {
            descriptor.cost_per_input_token = cost;
        }
        if let Some(cost) = self.cost_per_output_token {
            descriptor.cost_per_output_token = cost;
        }
        if let Some(quality) = self.quality {
            descriptor.quality = quality;
        }
        if let Some(latency) = self.avg_latency_ms {
            descriptor.avg_latency_ms = latency;
        }
        descriptor
    }
}

/// Source of stored model configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Every stored entry, active or not
    async fn get_all_model_configs(&self) -> anyhow::Result<Vec<StoredModelConfig>>;
}

/// Config store over a fixed list, typically the `[[models]]` config section
#[derive(Debug, Clone, Default)]
pub struct StaticConfigStore {
    entries: Vec<StoredModelConfig>,
}

impl StaticConfigStore {
    /// Store serving the given entries
    #[must_use]
    pub fn new(entries: Vec<StoredModelConfig>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn get_all_model_configs(&self) -> anyhow::Result<Vec<StoredModelConfig>> {
        Ok(self.entries.clone())
    }
}
