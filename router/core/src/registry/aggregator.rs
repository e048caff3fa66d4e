//! Model Registry Aggregator
//!
//! Builds the registry from three sources and publishes it as one immutable
//! snapshot:
//!
//! ```text
//!   StaticCatalog ──┐
//!                   ├──► merge by key ──► RegistrySnapshot ──► ModelRegistry::publish
//!   ConfigStore ────┤    (later wins,                           (pointer swap)
//!    (+ model_info) │     field-wise)
//!   Discovery ──────┘
//! ```
//!
//! Every source is fail-soft: a failing store, a failing `model_info` or a
//! failing discovery is logged and skipped. An empty result is published
//! like any other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::catalog::StaticCatalog;
use super::descriptor::{ModelDescriptor, ModelKey};
use crate::backend::{BackendAdapter, BackendRegistry};
use crate::collaborators::ConfigStore;

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of every known model at one point in time
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    models: Vec<ModelDescriptor>,
    index: HashMap<ModelKey, usize>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Snapshot with no models
    #[must_use]
    pub fn empty() -> Self {
        Self::from_models(Vec::new(), 0)
    }

    /// Build a snapshot; duplicate keys are folded together in order
    #[must_use]
    pub fn from_models(models: Vec<ModelDescriptor>, generation: u64) -> Self {
        let mut merged = MergeSet::default();
        for model in models {
            merged.merge(model);
        }
        let models = merged.into_models();
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key.clone(), i))
            .collect();
        Self {
            models,
            index,
            generation,
            loaded_at: Utc::now(),
        }
    }

    /// Descriptor for a key
    #[must_use]
    pub fn get(&self, key: &ModelKey) -> Option<&ModelDescriptor> {
        self.index.get(key).map(|&i| &self.models[i])
    }

    /// Whether a key is present
    #[must_use]
    pub fn contains(&self, key: &ModelKey) -> bool {
        self.index.contains_key(key)
    }

    /// Every model, in merge order
    #[must_use]
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Models the selector may pick: available and not unhealthy
    #[must_use]
    pub fn available_models(&self) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.is_selectable())
            .cloned()
            .collect()
    }

    /// Every model from one provider
    #[must_use]
    pub fn by_provider(&self, provider: &str) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.provider() == provider)
            .cloned()
            .collect()
    }

    /// Publication counter; 0 for the initial empty snapshot
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was built
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Number of models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the snapshot holds no models
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Insertion-ordered merge of descriptors by key
#[derive(Default)]
struct MergeSet {
    order: Vec<ModelKey>,
    entries: HashMap<ModelKey, ModelDescriptor>,
}

impl MergeSet {
    fn merge(&mut self, descriptor: ModelDescriptor) {
        match self.entries.remove(&descriptor.key) {
            Some(existing) => {
                let key = descriptor.key.clone();
                self.entries.insert(key, existing.merged_with(descriptor));
            }
            None => {
                self.order.push(descriptor.key.clone());
                self.entries.insert(descriptor.key.clone(), descriptor);
            }
        }
    }

    fn keys(&self) -> HashSet<ModelKey> {
        self.order.iter().cloned().collect()
    }

    fn into_models(mut self) -> Vec<ModelDescriptor> {
        self.order
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .collect()
    }
}

// ============================================================================
// Published Registry
// ============================================================================

/// Holder of the current snapshot
///
/// Readers clone the `Arc` and never hold the lock while working; publishing
/// swaps the pointer. Concurrent publishers resolve last-write-wins, and the
/// generation is assigned under the write lock, so the current snapshot
/// always carries the highest generation published so far.
#[derive(Debug)]
pub struct ModelRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Registry holding an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::empty())),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    /// Build a snapshot from `models` and make it current
    pub fn publish(&self, models: Vec<ModelDescriptor>) -> Arc<RegistrySnapshot> {
        // Merge outside the lock; only numbering and the swap happen inside
        let mut snapshot = RegistrySnapshot::from_models(models, 0);

        let mut current = self.current.write();
        snapshot.generation = current.generation + 1;
        let snapshot = Arc::new(snapshot);
        *current = Arc::clone(&snapshot);
        snapshot
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Merges catalog, stored configuration and live discovery
pub struct RegistryAggregator {
    catalog: StaticCatalog,
    config_store: Option<Arc<dyn ConfigStore>>,
    backends: BackendRegistry,
}

impl RegistryAggregator {
    /// Aggregator over a catalog and the registered backends
    #[must_use]
    pub fn new(catalog: StaticCatalog, backends: BackendRegistry) -> Self {
        Self {
            catalog,
            config_store: None,
            backends,
        }
    }

    /// Add a configuration store source
    #[must_use]
    pub fn with_config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Run every source and return the merged descriptors in merge order
    pub async fn load(&self) -> Vec<ModelDescriptor> {
        let mut merged = MergeSet::default();

        // 1. Static catalog: served only if some adapter handles the provider
        for entry in self.catalog.entries() {
            let served = self.backends.contains(entry.provider());
            merged.merge(entry.clone().with_available(entry.available && served));
        }
        debug!(models = merged.order.len(), "Catalog merged");

        // 2. Stored configuration, confirmed by the adapter
        for descriptor in self.load_stored().await {
            merged.merge(descriptor);
        }

        // 3. Live discovery of models no earlier source knew
        let known = merged.keys();
        let discovered = join_all(
            self.backends
                .adapters()
                .iter()
                .filter(|a| a.supports_discovery())
                .map(|a| discover(Arc::clone(a), &known)),
        )
        .await;
        for descriptor in discovered.into_iter().flatten() {
            merged.merge(descriptor);
        }

        let models = merged.into_models();
        info!(
            models = models.len(),
            available = models.iter().filter(|m| m.is_selectable()).count(),
            "Model registry loaded"
        );
        models
    }

    /// Load all sources and publish the result
    pub async fn reload(&self, registry: &ModelRegistry) -> Arc<RegistrySnapshot> {
        let models = self.load().await;
        let snapshot = registry.publish(models);
        info!(
            generation = snapshot.generation(),
            models = snapshot.len(),
            "Registry snapshot published"
        );
        snapshot
    }

    async fn load_stored(&self) -> Vec<ModelDescriptor> {
        let Some(store) = &self.config_store else {
            return Vec::new();
        };

        let entries = match store.get_all_model_configs().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(source = "config_store", error = %e, "Config store unavailable, skipping");
                return Vec::new();
            }
        };

        let lookups = entries.into_iter().filter(|e| e.is_active).map(|entry| {
            let adapter = self.backends.get(&entry.provider);
            async move {
                let Some(adapter) = adapter else {
                    warn!(
                        source = "config_store",
                        model = %entry.key(),
                        "No adapter registered for stored model, skipping"
                    );
                    return None;
                };
                match adapter.model_info(&entry.name).await {
                    Ok(Some(info)) => Some(entry.overlay(info.with_available(true))),
                    Ok(None) => {
                        warn!(
                            source = "config_store",
                            model = %entry.key(),
                            "Adapter does not know stored model, skipping"
                        );
                        None
                    }
                    Err(e) => {
                        warn!(
                            source = "config_store",
                            model = %entry.key(),
                            error = %e,
                            "Model info lookup failed, skipping"
                        );
                        None
                    }
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}

/// Discover models on one adapter that are not in `known`
async fn discover(adapter: Arc<dyn BackendAdapter>, known: &HashSet<ModelKey>) -> Vec<ModelDescriptor> {
    let provider = adapter.provider().to_string();

    let names = match adapter.list_models().await {
        Ok(names) => names,
        Err(e) => {
            warn!(source = "discovery", provider = %provider, error = %e, "Discovery failed, skipping provider");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let fresh: Vec<String> = names
        .into_iter()
        .filter(|name| !known.contains(&ModelKey::new(&provider, name)))
        .filter(|name| seen.insert(name.clone()))
        .collect();

    let infos = join_all(fresh.iter().map(|name| adapter.model_info(name))).await;

    fresh
        .iter()
        .zip(infos)
        .filter_map(|(name, info)| match info {
            Ok(Some(descriptor)) => Some(descriptor.with_available(true)),
            Ok(None) => {
                debug!(provider = %provider, model = %name, "Listed model has no info, skipping");
                None
            }
            Err(e) => {
                warn!(provider = %provider, model = %name, error = %e, "Model info lookup failed, skipping");
                None
            }
        })
        .collect()
}
