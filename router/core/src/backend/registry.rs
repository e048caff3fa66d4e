//! Adapter lookup by provider name

use std::sync::Arc;

use super::traits::BackendAdapter;

/// Registered adapters in registration order, plus the designated local one
#[derive(Clone, Default)]
pub struct BackendRegistry {
    adapters: Vec<Arc<dyn BackendAdapter>>,
    local_provider: Option<String>,
}

impl BackendRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any earlier adapter for the same provider
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        let provider = adapter.provider().to_string();
        if let Some(slot) = self.adapters.iter_mut().find(|a| a.provider() == provider) {
            *slot = adapter;
        } else {
            self.adapters.push(adapter);
        }
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Designate the always-available local provider
    #[must_use]
    pub fn with_local_provider(mut self, provider: impl Into<String>) -> Self {
        self.local_provider = Some(provider.into());
        self
    }

    /// Adapter for a provider
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<dyn BackendAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.provider() == provider)
            .cloned()
    }

    /// Whether an adapter is registered for a provider
    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        self.adapters.iter().any(|a| a.provider() == provider)
    }

    /// All adapters, in registration order
    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn BackendAdapter>] {
        &self.adapters
    }

    /// Designated local provider name, registered or not
    #[must_use]
    pub fn local_provider(&self) -> Option<&str> {
        self.local_provider.as_deref()
    }

    /// The local adapter, if one is designated and registered
    #[must_use]
    pub fn local(&self) -> Option<Arc<dyn BackendAdapter>> {
        self.local_provider.as_deref().and_then(|p| self.get(p))
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field(
                "providers",
                &self.adapters.iter().map(|a| a.provider()).collect::<Vec<_>>(),
            )
            .field("local_provider", &self.local_provider)
            .finish()
    }
}
