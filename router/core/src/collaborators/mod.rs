//! External collaborators
//!
//! Contracts the router consumes but does not own: stored model
//! configuration, prompt templates, usage/cost accounting, performance
//! metrics and auditing. Each contract ships with an in-memory
//! implementation so the router runs standalone.

mod audit;
mod config_store;
mod performance;
mod templates;
mod usage;

pub use audit::{
    truncate_chars, AuditEntry, AuditFilter, AuditRecord, AuditSink, ErrorAuditEntry,
    InMemoryAuditSink,
};
pub use config_store::{ConfigStore, StaticConfigStore, StoredModelConfig};
pub use performance::{
    AlertKind, AlertThresholds, Histogram, HistogramSnapshot, InMemoryPerformanceSink,
    ModelPerformance, PerformanceAlert, PerformanceSink, PerformanceSummary,
};
pub use templates::{render, InMemoryTemplateProvider, PromptTemplate, TemplateProvider};
pub use usage::{
    CostBucket, CostGroupBy, CostReport, InMemoryUsageSink, UsageRecord, UsageSink,
    DEFAULT_USAGE_CAPACITY,
};
