//! Router Core - Scenario-Driven Model Selection for AI Backends
//!
//! This crate routes AI requests to the right model. Callers name a
//! *scenario* ("resume_analysis", "quick_reply", ...) instead of a vendor;
//! the router picks a model from a live registry, dispatches with retries,
//! and accounts for every executed call.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          RequestRouter                           │
//! │   validate ─► select ─► template ─► dispatch ─► account          │
//! └──────┬──────────────┬───────────────────┬───────────────┬────────┘
//!        │              │                   │               │
//!        v              v                   v               v
//! ┌─────────────┐ ┌──────────────┐ ┌────────────────┐ ┌────────────┐
//! │  Registry   │ │   Scenario   │ │ RetryExecutor  │ │ Accountant │
//! │  snapshot   │ │   Selector   │ │   (backoff)    │ │ usage/perf │
//! │ (swap-only) │ │ + cascade    │ └───────┬────────┘ │  /audit    │
//! └──────┬──────┘ └──────────────┘         │          └────────────┘
//!        │ reload                          v
//! ┌──────┴───────────────────┐    ┌─────────────────┐
//! │   RegistryAggregator     │    │ BackendAdapter  │
//! │ catalog ─► stored ─► live│───►│ (Ollama, ...)   │
//! └──────────────────────────┘    └─────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`RequestRouter`]: Entry point for `call`, `stream` and `embed`
//! - [`ScenarioSelector`]: Weighted model selection with a fallback cascade
//! - [`RegistryAggregator`]: Builds registry snapshots from every source
//! - [`RetryExecutor`]: Exponential backoff around retryable failures
//! - [`ResponseStream`]: Cancellable stream with a wall-clock deadline
//! - [`RouterError`]: Typed error taxonomy
//!
//! # Quick Start
//!
//! ```ignore
//! use router_core::{config, AiRequest, BackendRegistry, RouteContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     let router = config.router_builder(BackendRegistry::new()).build();
//!     router.reload_models().await;
//!
//!     let ctx = RouteContext::new("user-42", "resume_analysis");
//!     let response = router.call(AiRequest::new("Summarize this resume"), &ctx).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Adapter contract, request/response envelope, Ollama adapter
//! - [`registry`]: Model descriptors, static catalog, snapshot aggregation
//! - [`routing`]: Selection, retry, streaming, accounting and the router
//! - [`collaborators`]: Config store, templates, usage, performance, audit
//! - [`config`]: TOML + environment configuration
//! - [`error`]: Error taxonomy

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod registry;
pub mod routing;

// Re-exports for convenience
pub use backend::{
    AiRequest, AiResponse, BackendAdapter, BackendRegistry, ChatMessage, OllamaAdapter,
    RequestMetadata, Role, StreamChunk, TokenUsage,
};
pub use config::{load_config, ConfigError, ConfigOverrides, ConfigSource, RouterConfig};
pub use error::{ErrorKind, Result, RouterError};
pub use registry::{
    HealthStatus, ModelDescriptor, ModelFeature, ModelKey, ModelRegistry, RegistryAggregator,
    RegistrySnapshot, StaticCatalog,
};
pub use routing::{
    ReloadSummary, RequestRouter, RequestRouterBuilder, ResponseStream, RetryConfig,
    RetryExecutor, RouteContext, ScenarioCatalog, ScenarioProfile, ScenarioSelector,
    SelectionStatistics, SelectionStrategy, StreamState,
};
