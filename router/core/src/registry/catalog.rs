//! Static model catalog
//!
//! Known models and their published attributes, independent of any live
//! backend. The catalog is the first and lowest-priority registry source.

use super::descriptor::{ModelDescriptor, ModelFeature};

/// Ordered list of known model descriptors
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<ModelDescriptor>,
}

impl StaticCatalog {
    /// Empty catalog
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of well-known hosted and local models
    #[must_use]
    pub fn builtin() -> Self {
        use ModelFeature::{Chat, Embeddings, FunctionCalling, JsonMode, Streaming, Vision};

        let entries = vec![
            ModelDescriptor::new("openai", "gpt-4o")
                .with_costs(2.5e-6, 1.0e-5)
                .with_latency_ms(1800)
                .with_quality(9)
                .with_context_window(128_000)
                .with_feature(Chat)
                .with_feature(Streaming)
                .with_feature(FunctionCalling)
                .with_feature(Vision)
                .with_feature(JsonMode),
            ModelDescriptor::new("openai", "gpt-4o-mini")
                .with_costs(1.5e-7, 6.0e-7)
                .with_latency_ms(900)
                .with_quality(7)
                .with_context_window(128_000)
                .with_feature(Chat)
                .with_feature(Streaming)
                .with_feature(FunctionCalling)
                .with_feature(JsonMode),
            ModelDescriptor::new("anthropic", "claude-3-5-sonnet")
                .with_costs(3.0e-6, 1.5e-5)
                .with_latency_ms(2000)
                .with_quality(9)
                .with_context_window(200_000)
                .with_feature(Chat)
                .with_feature(Streaming)
                .with_feature(FunctionCalling)
                .with_feature(Vision),
            ModelDescriptor::new("anthropic", "claude-3-5-haiku")
                .with_costs(8.0e-7, 4.0e-6)
                .with_latency_ms(800)
                .with_quality(7)
                .with_context_window(200_000)
                .with_feature(Chat)
                .with_feature(Streaming),
            ModelDescriptor::new("google", "gemini-1.5-pro")
                .with_costs(1.25e-6, 5.0e-6)
                .with_latency_ms(2200)
                .with_quality(8)
                .with_context_window(1_000_000)
                .with_feature(Chat)
                .with_feature(Streaming)
                .with_feature(Vision),
            ModelDescriptor::new("google", "gemini-1.5-flash")
                .with_costs(7.5e-8, 3.0e-7)
                .with_latency_ms(700)
                .with_quality(6)
                .with_context_window(1_000_000)
                .with_feature(Chat)
                .with_feature(Streaming),
            ModelDescriptor::new("deepseek", "deepseek-chat")
                .with_costs(2.7e-7, 1.1e-6)
                .with_latency_ms(1500)
                .with_quality(7)
                .with_context_window(64_000)
                .with_feature(Chat)
                .with_feature(Streaming)
                .with_feature(JsonMode),
            ModelDescriptor::new("ollama", "llama3.2")
                .with_latency_ms(1500)
                .with_quality(5)
                .with_context_window(128_000)
                .with_feature(Chat)
                .with_feature(Streaming),
            ModelDescriptor::new("ollama", "nomic-embed-text")
                .with_latency_ms(200)
                .with_quality(5)
                .with_context_window(8_192)
                .with_feature(Embeddings),
        ];

        Self { entries }
    }

    /// Add or replace an entry by key
    pub fn insert(&mut self, descriptor: ModelDescriptor) {
        if let Some(slot) = self.entries.iter_mut().find(|d| d.key == descriptor.key) {
            *slot = descriptor;
        } else {
            self.entries.push(descriptor);
        }
    }

    /// Builder form of [`insert`](Self::insert)
    #[must_use]
    pub fn with_entry(mut self, descriptor: ModelDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Entries in catalog order
    #[must_use]
    pub fn entries(&self) -> &[ModelDescriptor] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
