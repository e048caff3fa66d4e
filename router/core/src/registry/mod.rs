//! Model Registry
//!
//! Descriptors, the static catalog, and the aggregator that merges every
//! source into an atomically published snapshot.

mod aggregator;
mod catalog;
mod descriptor;

pub use aggregator::{ModelRegistry, RegistryAggregator, RegistrySnapshot};
pub use catalog::StaticCatalog;
pub use descriptor::{HealthStatus, ModelDescriptor, ModelFeature, ModelKey};
