//! Request Router
//!
//! The entry point for every request. Each call walks the same steps, in
//! order:
//!
//! ```text
//! validate ──► resolve model ──► template ──► dispatch (retry) ──► account
//!    │              │                              │
//!    │              └─ selector, or explicit id    └─ call | stream | embed
//!    └─ fails fast, touches nothing
//! ```
//!
//! Validation failures record nothing. Resolution failures are audited.
//! Once a model is resolved the call is executed and settles exactly one
//! usage record and one performance metric, whatever the outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::accounting::{Accountant, CallContext, CallOutcome};
use super::decision_log::{DecisionLog, SelectionDecision, SelectionStatistics};
use super::retry::{RetryConfig, RetryExecutor, RetryOutcome};
use super::scenario::ScenarioCatalog;
use super::selector::ScenarioSelector;
use super::stream::ResponseStream;
use crate::backend::{AiRequest, AiResponse, BackendAdapter, BackendRegistry, TokenUsage};
use crate::collaborators::{
    AuditSink, ConfigStore, InMemoryAuditSink, InMemoryPerformanceSink, InMemoryUsageSink,
    PerformanceSink, TemplateProvider, UsageSink,
};
use crate::error::{Result, RouterError};
use crate::registry::{
    ModelDescriptor, ModelKey, ModelRegistry, RegistryAggregator, RegistrySnapshot, StaticCatalog,
};

/// Default wall-clock budget for a whole stream
pub const DEFAULT_STREAM_DEADLINE: Duration = Duration::from_secs(120);

/// Default audit excerpt length, in characters
pub const DEFAULT_EXCERPT_CHARS: usize = 500;

/// Highest accepted sampling temperature
const MAX_TEMPERATURE: f32 = 2.0;

/// Who is asking, and for what
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteContext {
    /// Caller identity, carried into usage and audit records
    pub user_id: String,
    /// Scenario driving model selection
    pub scenario: String,
    /// Preferred template language
    pub language: Option<String>,
}

impl RouteContext {
    /// Context for a user and scenario
    pub fn new(user_id: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            scenario: scenario.into(),
            language: None,
        }
    }

    /// Prefer templates in this language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Result of a registry reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadSummary {
    /// Generation of the published snapshot
    pub generation: u64,
    /// Models in the snapshot
    pub models: usize,
    /// Models currently selectable
    pub available: usize,
}

impl From<&RegistrySnapshot> for ReloadSummary {
    fn from(snapshot: &RegistrySnapshot) -> Self {
        Self {
            generation: snapshot.generation(),
            models: snapshot.len(),
            available: snapshot.available_models().len(),
        }
    }
}

/// A resolved, ready-to-send request
struct Dispatch {
    adapter: Arc<dyn BackendAdapter>,
    request: AiRequest,
    call: CallContext,
}

/// Builder for [`RequestRouter`]
pub struct RequestRouterBuilder {
    backends: BackendRegistry,
    catalog: StaticCatalog,
    scenarios: ScenarioCatalog,
    config_store: Option<Arc<dyn ConfigStore>>,
    templates: Option<Arc<dyn TemplateProvider>>,
    usage: Option<Arc<dyn UsageSink>>,
    performance: Option<Arc<dyn PerformanceSink>>,
    audit: Option<Arc<dyn AuditSink>>,
    retry: RetryConfig,
    stream_deadline: Duration,
    decision_log_capacity: usize,
    excerpt_chars: usize,
}

impl Default for RequestRouterBuilder {
    fn default() -> Self {
        Self {
            backends: BackendRegistry::new(),
            catalog: StaticCatalog::builtin(),
            scenarios: ScenarioCatalog::builtin(),
            config_store: None,
            templates: None,
            usage: None,
            performance: None,
            audit: None,
            retry: RetryConfig::default(),
            stream_deadline: DEFAULT_STREAM_DEADLINE,
            decision_log_capacity: 1000,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl RequestRouterBuilder {
    /// Adapters the router dispatches to
    #[must_use]
    pub fn backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    /// Static catalog merged first on every reload
    #[must_use]
    pub fn catalog(mut self, catalog: StaticCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Scenario profiles
    #[must_use]
    pub fn scenarios(mut self, scenarios: ScenarioCatalog) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// Stored model configuration source
    #[must_use]
    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Prompt template source
    #[must_use]
    pub fn templates(mut self, templates: Arc<dyn TemplateProvider>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Usage sink; in-memory when unset
    #[must_use]
    pub fn usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = Some(sink);
        self
    }

    /// Performance sink; in-memory when unset
    #[must_use]
    pub fn performance_sink(mut self, sink: Arc<dyn PerformanceSink>) -> Self {
        self.performance = Some(sink);
        self
    }

    /// Audit sink; in-memory when unset
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Retry policy for dispatch
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Wall-clock budget for a whole stream
    #[must_use]
    pub fn stream_deadline(mut self, deadline: Duration) -> Self {
        self.stream_deadline = deadline;
        self
    }

    /// Selection decisions retained
    #[must_use]
    pub fn decision_log_capacity(mut self, capacity: usize) -> Self {
        self.decision_log_capacity = capacity;
        self
    }

    /// Audit excerpt length, in characters
    #[must_use]
    pub fn excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    /// Build the router with an empty registry
    ///
    /// Call [`RequestRouter::reload_models`] to populate it.
    #[must_use]
    pub fn build(self) -> RequestRouter {
        let mut aggregator = RegistryAggregator::new(self.catalog, self.backends.clone());
        if let Some(store) = self.config_store {
            aggregator = aggregator.with_config_store(store);
        }

        let log = Arc::new(DecisionLog::new(self.decision_log_capacity));
        let selector = ScenarioSelector::new(self.scenarios, self.backends.clone(), log);

        let accountant = Accountant::new(
            self.usage
                .unwrap_or_else(|| Arc::new(InMemoryUsageSink::new())),
            self.performance
                .unwrap_or_else(|| Arc::new(InMemoryPerformanceSink::new())),
            self.audit
                .unwrap_or_else(|| Arc::new(InMemoryAuditSink::default())),
            self.excerpt_chars,
        );

        RequestRouter {
            registry: ModelRegistry::new(),
            aggregator,
            backends: self.backends,
            selector,
            retry: RetryExecutor::new(self.retry),
            accountant: Arc::new(accountant),
            templates: self.templates,
            stream_deadline: self.stream_deadline,
        }
    }
}

/// Routes requests to models and accounts for them
pub struct RequestRouter {
    registry: ModelRegistry,
    aggregator: RegistryAggregator,
    backends: BackendRegistry,
    selector: ScenarioSelector,
    retry: RetryExecutor,
    accountant: Arc<Accountant>,
    templates: Option<Arc<dyn TemplateProvider>>,
    stream_deadline: Duration,
}

impl RequestRouter {
    /// Start building a router
    #[must_use]
    pub fn builder() -> RequestRouterBuilder {
        RequestRouterBuilder::default()
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Complete a request
    pub async fn call(&self, request: AiRequest, ctx: &RouteContext) -> Result<AiResponse> {
        let Dispatch {
            adapter,
            request,
            call,
        } = self.prepare(request, ctx, true).await?;

        let RetryOutcome { result, attempts } = self.retry.run(|| adapter.call(&request)).await;

        match result {
            Ok(mut response) => {
                if response.usage == TokenUsage::default() {
                    response.usage = TokenUsage::new(
                        TokenUsage::estimate_tokens(&call.prompt),
                        TokenUsage::estimate_tokens(&response.content),
                    );
                }
                if response.provider.is_empty() {
                    response.provider = call.model.provider().to_string();
                }
                if response.model.is_empty() {
                    response.model = call.model.name().to_string();
                }
                info!(
                    model = %call.model.key,
                    attempts,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Call completed"
                );
                self.accountant
                    .settle(call, CallOutcome::Succeeded {
                        usage: response.usage,
                        content: response.content.clone(),
                    })
                    .await;
                Ok(response)
            }
            Err(error) => {
                self.settle_failure(call, error.clone(), attempts).await;
                Err(error)
            }
        }
    }

    /// Stream a request
    ///
    /// Opening the stream is retried; once chunks flow, failures end the
    /// stream instead.
    pub async fn stream(&self, request: AiRequest, ctx: &RouteContext) -> Result<ResponseStream> {
        let Dispatch {
            adapter,
            request,
            call,
        } = self.prepare(request, ctx, true).await?;

        let RetryOutcome { result, attempts } = self.retry.run(|| adapter.stream(&request)).await;

        match result {
            Ok(receiver) => {
                debug!(model = %call.model.key, attempts, "Stream opened");
                Ok(ResponseStream::new(
                    receiver,
                    Instant::now() + self.stream_deadline,
                    Arc::clone(&self.accountant),
                    call,
                ))
            }
            Err(error) => {
                self.settle_failure(call, error.clone(), attempts).await;
                Err(error)
            }
        }
    }

    /// Embed `text` with the model `model_id` (`provider:model`)
    pub async fn embed(&self, text: &str, model_id: &str, ctx: &RouteContext) -> Result<Vec<f32>> {
        if model_id.trim().is_empty() {
            return Err(RouterError::invalid("embedding model is required"));
        }
        let request = AiRequest::new(text).with_model(model_id);
        let Dispatch {
            adapter,
            request,
            call,
        } = self.prepare(request, ctx, false).await?;
        let model_name = call.model.name().to_string();

        let RetryOutcome { result, attempts } = self
            .retry
            .run(|| adapter.embed(&request.prompt, &model_name))
            .await;

        match result {
            Ok(vector) => {
                debug!(model = %call.model.key, dimensions = vector.len(), "Embedding completed");
                let usage = TokenUsage::new(TokenUsage::estimate_tokens(&call.prompt), 0);
                self.accountant
                    .settle(call, CallOutcome::Succeeded {
                        usage,
                        content: String::new(),
                    })
                    .await;
                Ok(vector)
            }
            Err(error) => {
                self.settle_failure(call, error.clone(), attempts).await;
                Err(error)
            }
        }
    }

    /// Model `scenario` would be routed to right now
    ///
    /// Runs the selector against the current snapshot without dispatching
    /// and without recording a decision, so statistics only count traffic.
    pub async fn preview_model(&self, scenario: &str) -> Result<ModelDescriptor> {
        let snapshot = self.registry.snapshot();
        self.selector
            .preview_for_scenario(scenario, &snapshot.available_models())
            .await
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Models that can currently be selected
    #[must_use]
    pub fn get_available_models(&self) -> Vec<ModelDescriptor> {
        self.registry.snapshot().available_models()
    }

    /// Every registered model of one provider, available or not
    #[must_use]
    pub fn get_models_by_provider(&self, provider: &str) -> Vec<ModelDescriptor> {
        self.registry.snapshot().by_provider(provider)
    }

    /// Registry entry for `provider:model`
    pub fn get_model_info(&self, model_id: &str) -> Result<Option<ModelDescriptor>> {
        let key = ModelKey::parse(model_id)?;
        Ok(self.registry.snapshot().get(&key).cloned())
    }

    /// Current registry snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    /// Rebuild the registry from every source and publish it
    ///
    /// Requests in flight keep the snapshot they started with.
    pub async fn reload_models(&self) -> ReloadSummary {
        let snapshot = self.aggregator.reload(&self.registry).await;
        let summary = ReloadSummary::from(snapshot.as_ref());
        info!(
            generation = summary.generation,
            models = summary.models,
            available = summary.available,
            "Model registry reloaded"
        );
        summary
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Selection counts over the retained decision window
    #[must_use]
    pub fn get_selection_statistics(&self) -> SelectionStatistics {
        self.selector.decision_log().statistics()
    }

    /// Up to `limit` most recent selection decisions, oldest first
    #[must_use]
    pub fn get_selection_log(&self, limit: usize) -> Vec<SelectionDecision> {
        self.selector.decision_log().recent(limit)
    }

    /// Registered adapters
    #[must_use]
    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Scenario profiles in use
    #[must_use]
    pub fn scenarios(&self) -> &ScenarioCatalog {
        self.selector.scenarios()
    }

    /// Accountant writing usage, metrics and audit records
    #[must_use]
    pub fn accountant(&self) -> &Arc<Accountant> {
        &self.accountant
    }

    // ========================================================================
    // Steps
    // ========================================================================

    /// Validate, resolve and template; ready for dispatch
    async fn prepare(&self, request: AiRequest, ctx: &RouteContext, render: bool) -> Result<Dispatch> {
        if let Err(error) = validate(&request) {
            warn!(scenario = %ctx.scenario, user = %ctx.user_id, error = %error, "Rejected request");
            return Err(error);
        }

        let model = match self.resolve_model(&request, ctx).await {
            Ok(model) => model,
            Err(error) => {
                self.accountant
                    .record_unrouted_failure(&error, &ctx.scenario, &ctx.user_id)
                    .await;
                return Err(error);
            }
        };

        let prompt = if render {
            self.render_prompt(&request, &model, ctx).await
        } else {
            request.prompt.clone()
        };

        let call = CallContext {
            user_id: ctx.user_id.clone(),
            scenario: ctx.scenario.clone(),
            model,
            prompt,
            request_id: request.metadata.request_id.clone(),
            session_id: request.metadata.session_id.clone(),
            started: Instant::now(),
        };

        let Some(adapter) = self.backends.get(call.model.provider()) else {
            let error = RouterError::unavailable(format!(
                "no adapter registered for provider '{}'",
                call.model.provider()
            ));
            self.settle_failure(call, error.clone(), 0).await;
            return Err(error);
        };

        let mut request = request;
        request.prompt.clone_from(&call.prompt);
        request.model = Some(call.model.name().to_string());

        Ok(Dispatch {
            adapter,
            request,
            call,
        })
    }

    /// Explicit model if the request names one, else the selector's choice
    async fn resolve_model(&self, request: &AiRequest, ctx: &RouteContext) -> Result<ModelDescriptor> {
        let snapshot = self.registry.snapshot();

        let explicit = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let Some(model_id) = explicit else {
            let selected = self
                .selector
                .select_for_scenario(&ctx.scenario, &snapshot.available_models())
                .await?;
            let key = ModelKey::parse(&selected.id())?;
            // Cascade picks may come straight from the local adapter
            return Ok(snapshot.get(&key).cloned().unwrap_or(selected));
        };

        let key = ModelKey::parse(model_id)?;
        if let Some(model) = snapshot.get(&key) {
            return Ok(model.clone());
        }

        if let Some(adapter) = self.backends.get(&key.provider) {
            match adapter.model_info(&key.name).await {
                Ok(Some(model)) => {
                    debug!(model = %key, "Resolved model from its adapter");
                    return Ok(model);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(model = %key, error = %error, "Model info lookup failed");
                }
            }
        }

        Err(RouterError::invalid(format!("unknown model '{key}'")))
    }

    /// Rendered template if the request names one that exists, else the prompt
    async fn render_prompt(
        &self,
        request: &AiRequest,
        model: &ModelDescriptor,
        ctx: &RouteContext,
    ) -> String {
        let Some(name) = request.metadata.template.as_deref() else {
            return request.prompt.clone();
        };
        let Some(templates) = &self.templates else {
            debug!(template = name, "No template provider, using the prompt as given");
            return request.prompt.clone();
        };

        let Some(template) = templates
            .get_template(name, ctx.language.as_deref(), Some(model.provider()))
            .await
        else {
            warn!(template = name, "Template not found, using the prompt as given");
            return request.prompt.clone();
        };

        let mut vars = request.metadata.template_vars.clone();
        vars.entry("prompt".to_string())
            .or_insert_with(|| request.prompt.clone());
        templates.render_template(&template, &vars)
    }

    async fn settle_failure(&self, call: CallContext, error: RouterError, attempts: u32) {
        self.accountant
            .settle(call, CallOutcome::Failed {
                error,
                usage: TokenUsage::default(),
                stage: "dispatch",
                attempts,
            })
            .await;
    }
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRouter")
            .field("backends", &self.backends)
            .field("generation", &self.registry.snapshot().generation())
            .field("stream_deadline", &self.stream_deadline)
            .finish_non_exhaustive()
    }
}

/// Reject malformed requests before anything else runs
fn validate(request: &AiRequest) -> Result<()> {
    if request.prompt.trim().is_empty() {
        return Err(RouterError::invalid("prompt must not be empty"));
    }
    if let Some(temperature) = request.temperature {
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(RouterError::invalid(format!(
                "temperature must be within 0..={MAX_TEMPERATURE}, got {temperature}"
            )));
        }
    }
    if request.max_tokens == Some(0) {
        return Err(RouterError::invalid("max_tokens must be at least 1"));
    }
    Ok(())
}
