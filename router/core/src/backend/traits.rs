//! Backend Adapter Traits
//!
//! The normalized request/response envelope and the capability interface
//! every vendor integration implements. The router never branches on vendor
//! identity; the only vendor-specific value it sees is the provider name an
//! adapter declares, which becomes the first half of every registry key.
//!
//! # Streaming
//!
//! `stream` hands back the receiving half of a bounded channel. Adapters
//! produce [`StreamChunk`]s from a spawned task and must stop producing once
//! the receiver is dropped (a failed `send` is the signal).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, RouterError};
use crate::registry::ModelDescriptor;

// ============================================================================
// Request Envelope
// ============================================================================

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// End user
    User,
    /// Model output
    Assistant,
}

/// One entry of message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// Create a message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request metadata: template selection and correlation ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Prompt template to render in place of the raw prompt
    pub template: Option<String>,
    /// Variables substituted into the template
    pub template_vars: HashMap<String, String>,
    /// Caller correlation id
    pub request_id: Option<String>,
    /// Caller session id
    pub session_id: Option<String>,
}

/// Normalized AI request, identical for every backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    /// Prompt text (required, non-blank)
    pub prompt: String,
    /// Prior conversation, oldest first
    pub messages: Vec<ChatMessage>,
    /// Explicit `provider:model` id; the selector chooses when absent.
    /// Adapters receive the bare model name here.
    pub model: Option<String>,
    /// Sampling temperature, valid range `[0, 2]`
    pub temperature: Option<f32>,
    /// Output token cap, at least 1
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Vec<String>,
    /// Template and correlation metadata
    pub metadata: RequestMetadata,
}

impl AiRequest {
    /// Create a request for a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Pin an explicit `provider:model`
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set temperature (validated by the router, not clamped here)
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Append a history message
    #[must_use]
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Add a stop sequence
    #[must_use]
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    /// Render a named template instead of the raw prompt
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.metadata.template = Some(name.into());
        self
    }

    /// Add a template variable
    #[must_use]
    pub fn with_template_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.template_vars.insert(key.into(), value.into());
        self
    }

    /// Set the caller correlation id
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.request_id = Some(id.into());
        self
    }

    /// Set the caller session id
    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.session_id = Some(id.into());
        self
    }
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Token counts for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create usage counts
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Rough count for text when a backend reports none: four characters per token
    #[must_use]
    pub fn estimate_tokens(text: &str) -> u64 {
        let chars = text.chars().count() as u64;
        chars.div_ceil(4)
    }
}

/// Normalized AI response, identical for every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    /// Generated text
    pub content: String,
    /// Token counts
    pub usage: TokenUsage,
    /// Model name that produced the content
    pub model: String,
    /// Provider that served the call
    pub provider: String,
    /// Why generation stopped (`stop`, `length`, ...)
    pub finish_reason: Option<String>,
}

/// One event pulled from an adapter stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental text
    Delta(String),
    /// Generation finished
    Done {
        /// Final counts, if the backend reports them
        usage: Option<TokenUsage>,
        /// Why generation stopped
        finish_reason: Option<String>,
    },
    /// Backend failed mid-stream
    Error(RouterError),
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Capability interface implemented once per vendor or local runtime
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Provider name used in registry keys (e.g. `"ollama"`, `"openai"`)
    fn provider(&self) -> &str;

    /// Single-shot completion
    async fn call(&self, request: &AiRequest) -> Result<AiResponse>;

    /// Incremental completion
    async fn stream(&self, request: &AiRequest) -> Result<mpsc::Receiver<StreamChunk>>;

    /// Whether `list_models` enumerates anything
    fn supports_discovery(&self) -> bool {
        false
    }

    /// Model names this backend currently serves
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Authoritative descriptor for a model, `None` when the backend does not know it
    async fn model_info(&self, name: &str) -> Result<Option<ModelDescriptor>>;

    /// Embedding vector for text
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;

    /// Model to use when this adapter is the last resort
    fn default_model(&self) -> Option<&str> {
        None
    }

    /// Cheap reachability probe
    async fn health_check(&self) -> bool {
        true
    }
}
