//! Scripted adapters and stores for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{AiRequest, AiResponse, BackendAdapter, StreamChunk, TokenUsage};
use crate::collaborators::{ConfigStore, StoredModelConfig};
use crate::error::{Result, RouterError};
use crate::registry::ModelDescriptor;

/// How a scripted stream behaves after its chunks are sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// Drop the sender
    Close,
    /// Keep the sender open until the receiver goes away
    Hang,
}

/// Adapter whose every answer is scripted
pub struct MockAdapter {
    provider: String,
    default_model: Option<String>,
    models: HashMap<String, ModelDescriptor>,
    discoverable: Option<Vec<String>>,
    discovery_fails: bool,
    failing_model_info: HashSet<String>,
    healthy: bool,
    call_failures: Mutex<VecDeque<RouterError>>,
    response: String,
    usage: Option<TokenUsage>,
    stream_chunks: Vec<StreamChunk>,
    stream_end: StreamEnd,
    chunk_delay: Option<Duration>,
    embedding: Vec<f32>,
    /// `call` invocations
    pub calls: AtomicUsize,
    /// `stream` invocations
    pub streams: AtomicUsize,
    /// `embed` invocations
    pub embeds: AtomicUsize,
    /// Set once a hanging stream notices its receiver is gone
    pub released: Arc<AtomicBool>,
    /// Last request seen by `call` or `stream`
    pub last_request: Mutex<Option<AiRequest>>,
}

impl MockAdapter {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            default_model: None,
            models: HashMap::new(),
            discoverable: None,
            discovery_fails: false,
            failing_model_info: HashSet::new(),
            healthy: true,
            call_failures: Mutex::new(VecDeque::new()),
            response: "mock response".to_string(),
            usage: Some(TokenUsage::new(10, 5)),
            stream_chunks: vec![
                StreamChunk::Delta("Hello".into()),
                StreamChunk::Delta(" world".into()),
                StreamChunk::Done {
                    usage: Some(TokenUsage::new(3, 2)),
                    finish_reason: Some("stop".into()),
                },
            ],
            stream_end: StreamEnd::Close,
            chunk_delay: None,
            embedding: vec![0.1, 0.2, 0.3],
            calls: AtomicUsize::new(0),
            streams: AtomicUsize::new(0),
            embeds: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_default_model(mut self, name: &str) -> Self {
        self.default_model = Some(name.to_string());
        self
    }

    pub fn with_model(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.insert(descriptor.name().to_string(), descriptor);
        self
    }

    pub fn with_failing_model_info(mut self, name: &str) -> Self {
        self.failing_model_info.insert(name.to_string());
        self
    }

    pub fn with_discoverable(mut self, names: &[&str]) -> Self {
        self.discoverable = Some(names.iter().map(|n| (*n).to_string()).collect());
        self
    }

    /// Advertises discovery but fails to list
    pub fn with_failing_discovery(mut self) -> Self {
        self.discoverable = Some(Vec::new());
        self.discovery_fails = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Fail the next calls (and stream opens) with these errors, in order
    pub fn with_failures(self, errors: Vec<RouterError>) -> Self {
        self.call_failures.lock().extend(errors);
        self
    }

    pub fn with_response(mut self, content: &str, usage: Option<TokenUsage>) -> Self {
        self.response = content.to_string();
        self.usage = usage;
        self
    }

    pub fn with_stream(mut self, chunks: Vec<StreamChunk>, end: StreamEnd) -> Self {
        self.stream_chunks = chunks;
        self.stream_end = end;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    fn next_failure(&self) -> Option<RouterError> {
        self.call_failures.lock().pop_front()
    }
}

#[async_trait]
impl BackendAdapter for MockAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn call(&self, request: &AiRequest) -> Result<AiResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        Ok(AiResponse {
            content: self.response.clone(),
            usage: self.usage.unwrap_or_default(),
            model: request.model.clone().unwrap_or_default(),
            provider: self.provider.clone(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn stream(&self, request: &AiRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if let Some(err) = self.next_failure() {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(16);
        let chunks = self.stream_chunks.clone();
        let end = self.stream_end.clone();
        let delay = self.chunk_delay;
        let released = Arc::clone(&self.released);

        tokio::spawn(async move {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(chunk).await.is_err() {
                    released.store(true, Ordering::SeqCst);
                    return;
                }
            }
            if end == StreamEnd::Hang {
                tx.closed().await;
                released.store(true, Ordering::SeqCst);
            }
        });

        Ok(rx)
    }

    fn supports_discovery(&self) -> bool {
        self.discoverable.is_some()
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        if self.discovery_fails {
            return Err(RouterError::unavailable("discovery down"));
        }
        Ok(self.discoverable.clone().unwrap_or_default())
    }

    async fn model_info(&self, name: &str) -> Result<Option<ModelDescriptor>> {
        if self.failing_model_info.contains(name) {
            return Err(RouterError::backend("model info failed", true));
        }
        Ok(self.models.get(name).cloned())
    }

    async fn embed(&self, _text: &str, _model: &str) -> Result<Vec<f32>> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        Ok(self.embedding.clone())
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

/// Store that always errors
pub struct FailingConfigStore;

#[async_trait]
impl ConfigStore for FailingConfigStore {
    async fn get_all_model_configs(&self) -> anyhow::Result<Vec<StoredModelConfig>> {
        anyhow::bail!("database unreachable")
    }
}
