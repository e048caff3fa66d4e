//! Backend Adapters
//!
//! The capability interface every vendor integration implements, the
//! normalized request/response envelope, and lookup of adapters by provider.
//!
//! # Available Adapters
//!
//! - **Ollama**: Local LLM server (default local adapter)
//!
//! Hosted vendors plug in by implementing [`BackendAdapter`] and registering
//! with a [`BackendRegistry`].
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use router_core::backend::{BackendRegistry, OllamaAdapter};
//!
//! let backends = BackendRegistry::new()
//!     .with_adapter(Arc::new(OllamaAdapter::from_env()))
//!     .with_local_provider("ollama");
//! ```

mod ollama;
mod registry;
mod traits;

pub use ollama::{OllamaAdapter, OLLAMA_PROVIDER};
pub use registry::BackendRegistry;
pub use traits::{
    AiRequest, AiResponse, BackendAdapter, ChatMessage, RequestMetadata, Role, StreamChunk,
    TokenUsage,
};
