//! Ollama Adapter
//!
//! Local backend served by an Ollama daemon. This is the default designated
//! local adapter: the selector falls back to it when the registry has nothing
//! better to offer.
//!
//! # Ollama API
//!
//! - `/api/chat` - Chat completions, streaming (NDJSON) or batch
//! - `/api/tags` - Installed models (discovery)
//! - `/api/show` - Details for one model
//! - `/api/embed` - Embedding vectors

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::traits::{AiRequest, AiResponse, BackendAdapter, Role, StreamChunk, TokenUsage};
use crate::error::{Result, RouterError};
use crate::registry::{ModelDescriptor, ModelFeature};

/// Provider name registered for Ollama models
pub const OLLAMA_PROVIDER: &str = "ollama";

/// Quality rating assumed for local models the catalog does not know
const LOCAL_QUALITY: u8 = 5;

/// Latency assumed for local models the catalog does not know
const LOCAL_LATENCY_MS: u64 = 1500;

/// Ollama adapter
#[derive(Clone, Debug)]
pub struct OllamaAdapter {
    host: String,
    port: u16,
    default_model: String,
    http_client: reqwest::Client,
}

impl OllamaAdapter {
    /// Create an adapter for `host:port`
    pub fn new(host: impl Into<String>, port: u16, default_model: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            default_model: default_model.into(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create from `OLLAMA_HOST`, `OLLAMA_PORT` and `OLLAMA_MODEL`
    #[must_use]
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Self::new(host, port, model)
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    /// Build the `/api/chat` body
    fn chat_body(&self, request: &AiRequest, stream: bool) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let mut messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": role_name(m.role), "content": m.content }))
            .collect();
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut options = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if !request.stop.is_empty() {
            options.insert("stop".into(), json!(request.stop));
        }

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        body
    }

    fn descriptor_for(
        &self,
        name: &str,
        context_window: u32,
        features: &[ModelFeature],
    ) -> ModelDescriptor {
        let mut descriptor = ModelDescriptor::new(OLLAMA_PROVIDER, name)
            .with_quality(LOCAL_QUALITY)
            .with_latency_ms(LOCAL_LATENCY_MS)
            .with_context_window(context_window);
        descriptor.features.extend(features.iter().copied());
        descriptor
    }
}

/// Map `/api/show` capabilities; older servers omit them and only serve chat models
fn features_from_capabilities(data: &Value) -> Vec<ModelFeature> {
    let Some(capabilities) = data.get("capabilities").and_then(Value::as_array) else {
        return vec![ModelFeature::Chat, ModelFeature::Streaming];
    };

    let mut features = Vec::new();
    for capability in capabilities.iter().filter_map(Value::as_str) {
        match capability {
            "completion" => {
                features.push(ModelFeature::Chat);
                features.push(ModelFeature::Streaming);
            }
            "embedding" => features.push(ModelFeature::Embeddings),
            "tools" => features.push(ModelFeature::FunctionCalling),
            "vision" => features.push(ModelFeature::Vision),
            _ => {}
        }
    }
    features
}

impl Default for OllamaAdapter {
    fn default() -> Self {
        Self::new("localhost", 11434, "llama3.2")
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Map a non-success HTTP status to a typed error
fn status_error(status: StatusCode, body: &str) -> RouterError {
    let message = format!("Ollama returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RouterError::backend(message, true)
    } else {
        RouterError::backend(message, false)
    }
}

fn usage_from(data: &Value) -> Option<TokenUsage> {
    let input = data.get("prompt_eval_count").and_then(Value::as_u64);
    let output = data.get("eval_count").and_then(Value::as_u64);
    match (input, output) {
        (None, None) => None,
        (i, o) => Some(TokenUsage::new(i.unwrap_or(0), o.unwrap_or(0))),
    }
}

/// Parse one NDJSON line from a streaming `/api/chat` response
fn parse_chat_line(line: &str) -> Option<Vec<StreamChunk>> {
    let data: Value = serde_json::from_str(line).ok()?;

    if let Some(error) = data.get("error").and_then(Value::as_str) {
        return Some(vec![StreamChunk::Error(RouterError::backend(error, false))]);
    }

    let mut chunks = Vec::new();
    if let Some(token) = data
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        if !token.is_empty() {
            chunks.push(StreamChunk::Delta(token.to_string()));
        }
    }

    if data.get("done").and_then(Value::as_bool).unwrap_or(false) {
        chunks.push(StreamChunk::Done {
            usage: usage_from(&data),
            finish_reason: data
                .get("done_reason")
                .and_then(Value::as_str)
                .map(String::from),
        });
    }
    Some(chunks)
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
    fn provider(&self) -> &str {
        OLLAMA_PROVIDER
    }

    async fn call(&self, request: &AiRequest) -> Result<AiResponse> {
        let response = self
            .http_client
            .post(self.url("/api/chat"))
            .json(&self.chat_body(request, false))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let data: Value = response.json().await?;
        let content = data
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let model = data
            .get("model")
            .and_then(Value::as_str)
            .map_or_else(|| self.default_model.clone(), String::from);

        Ok(AiResponse {
            usage: usage_from(&data).unwrap_or_else(|| {
                TokenUsage::new(
                    TokenUsage::estimate_tokens(&request.prompt),
                    TokenUsage::estimate_tokens(&content),
                )
            }),
            content,
            model,
            provider: OLLAMA_PROVIDER.to_string(),
            finish_reason: data
                .get("done_reason")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    async fn stream(&self, request: &AiRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        let (tx, rx) = mpsc::channel(100);

        let response = self
            .http_client
            .post(self.url("/api/chat"))
            .json(&self.chat_body(request, true))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let Some(events) = parse_chat_line(line.trim()) else {
                                continue;
                            };
                            for event in events {
                                let terminal = !matches!(event, StreamChunk::Delta(_));
                                if tx.send(event).await.is_err() {
                                    // Receiver dropped
                                    debug!("Ollama stream receiver dropped");
                                    return;
                                }
                                if terminal {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamChunk::Error(RouterError::from(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    fn supports_discovery(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(self.url("/api/tags"))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let data: Value = response.json().await?;
        Ok(data
            .get("models")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name")?.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn model_info(&self, name: &str) -> Result<Option<ModelDescriptor>> {
        let response = self
            .http_client
            .post(self.url("/api/show"))
            .timeout(Duration::from_secs(10))
            .json(&json!({ "model": name }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let data: Value = response.json().await?;
        let context_window = data
            .get("model_info")
            .and_then(Value::as_object)
            .and_then(|info| {
                info.iter()
                    .find(|(k, _)| k.ends_with(".context_length"))
                    .and_then(|(_, v)| v.as_u64())
            })
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        let features = features_from_capabilities(&data);
        let mut descriptor = self.descriptor_for(name, context_window, &features);
        descriptor.last_health_check = Some(chrono::Utc::now());
        Ok(Some(descriptor))
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let response = self
            .http_client
            .post(self.url("/api/embed"))
            .json(&json!({ "model": model, "input": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let data: Value = response.json().await?;
        data.get("embeddings")
            .and_then(Value::as_array)
            .and_then(|all| all.first())
            .and_then(Value::as_array)
            .map(|v| {
                v.iter()
                    .filter_map(Value::as_f64)
                    .map(|x| x as f32)
                    .collect()
            })
            .ok_or_else(|| RouterError::backend("Ollama embed response had no vector", false))
    }

    fn default_model(&self) -> Option<&str> {
        Some(&self.default_model)
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.url("/api/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}
