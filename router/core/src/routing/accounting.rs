//! Call accounting
//!
//! Turns the outcome of one executed call into exactly one usage record,
//! exactly one performance metric and one audit entry. [`Accountant::settle`]
//! consumes the [`CallContext`], so a call cannot be settled twice.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::TokenUsage;
use crate::collaborators::{
    truncate_chars, AuditEntry, AuditSink, PerformanceSink, UsageRecord, UsageSink,
};
use crate::error::RouterError;
use crate::registry::ModelDescriptor;

/// Error code recorded for caller-cancelled streams
pub const CANCELLED_CODE: &str = "CANCELLED";

/// Who, what and when for one executed call
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Caller
    pub user_id: String,
    /// Scenario routed for
    pub scenario: String,
    /// Model the call was dispatched to
    pub model: ModelDescriptor,
    /// Prompt actually sent, after templating
    pub prompt: String,
    /// Caller correlation id
    pub request_id: Option<String>,
    /// Caller session id
    pub session_id: Option<String>,
    /// When dispatch began
    pub started: Instant,
}

/// How a call ended
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// Response obtained
    Succeeded {
        /// Token counts
        usage: TokenUsage,
        /// Response text, truncated for the audit entry
        content: String,
    },
    /// Definitive failure
    Failed {
        /// The error returned to the caller
        error: RouterError,
        /// Tokens attributed before the failure
        usage: TokenUsage,
        /// Router stage that failed
        stage: &'static str,
        /// Backend invocations made
        attempts: u32,
    },
    /// Caller stopped consuming a stream
    Cancelled {
        /// Tokens attributed before cancellation
        usage: TokenUsage,
    },
}

impl CallOutcome {
    fn usage(&self) -> TokenUsage {
        match self {
            Self::Succeeded { usage, .. }
            | Self::Failed { usage, .. }
            | Self::Cancelled { usage } => *usage,
        }
    }
}

/// Writes usage, metrics and audit records
pub struct Accountant {
    usage: Arc<dyn UsageSink>,
    performance: Arc<dyn PerformanceSink>,
    audit: Arc<dyn AuditSink>,
    excerpt_chars: usize,
}

impl Accountant {
    /// Accountant over the three sinks
    #[must_use]
    pub fn new(
        usage: Arc<dyn UsageSink>,
        performance: Arc<dyn PerformanceSink>,
        audit: Arc<dyn AuditSink>,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            usage,
            performance,
            audit,
            excerpt_chars,
        }
    }

    /// The usage sink
    #[must_use]
    pub fn usage_sink(&self) -> &Arc<dyn UsageSink> {
        &self.usage
    }

    /// The performance sink
    #[must_use]
    pub fn performance_sink(&self) -> &Arc<dyn PerformanceSink> {
        &self.performance
    }

    /// The audit sink
    #[must_use]
    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Record the outcome of an executed call
    pub async fn settle(&self, ctx: CallContext, outcome: CallOutcome) {
        let latency_ms = u64::try_from(ctx.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let usage = outcome.usage();
        let cost = ctx.model.cost_for(usage.input_tokens, usage.output_tokens);
        let model = ctx.model.name().to_string();
        let provider = ctx.model.provider().to_string();

        let (success, metric_success, error_code) = match &outcome {
            CallOutcome::Succeeded { .. } => (true, true, None),
            CallOutcome::Failed { error, .. } => (false, false, Some(error.code().to_string())),
            // Cancellation is not a backend fault
            CallOutcome::Cancelled { .. } => (false, true, Some(CANCELLED_CODE.to_string())),
        };

        self.usage
            .record_usage(UsageRecord {
                id: Uuid::new_v4(),
                user_id: ctx.user_id.clone(),
                model: model.clone(),
                provider: provider.clone(),
                scenario: ctx.scenario.clone(),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cost,
                latency_ms,
                success,
                request_id: ctx.request_id.clone(),
                session_id: ctx.session_id.clone(),
                error_code,
                created_at: Utc::now(),
            })
            .await;

        self.performance
            .record_metrics(&model, &provider, latency_ms, metric_success)
            .await;

        match outcome {
            CallOutcome::Succeeded { content, .. } => {
                self.audit
                    .log_ai_call(AuditEntry {
                        user_id: ctx.user_id,
                        scenario: ctx.scenario,
                        model,
                        provider,
                        prompt_excerpt: truncate_chars(&ctx.prompt, self.excerpt_chars),
                        response_excerpt: truncate_chars(&content, self.excerpt_chars),
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        latency_ms,
                        request_id: ctx.request_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                debug!(latency_ms, cost, "Call settled");
            }
            CallOutcome::Failed {
                error,
                stage,
                attempts,
                ..
            } => {
                let stack = format!("stage={stage} attempts={attempts}");
                self.audit
                    .log_error(
                        &model,
                        &provider,
                        error.code(),
                        error.message(),
                        Some(&stack),
                        &ctx.scenario,
                        &ctx.user_id,
                    )
                    .await;
                warn!(
                    model = %ctx.model.key,
                    code = error.code(),
                    stage,
                    attempts,
                    latency_ms,
                    "Call failed"
                );
            }
            CallOutcome::Cancelled { .. } => {
                debug!(model = %ctx.model.key, latency_ms, "Cancelled call settled");
            }
        }
    }

    /// Record a failure that happened before any backend was called
    pub async fn record_unrouted_failure(&self, error: &RouterError, scenario: &str, user_id: &str) {
        self.audit
            .log_error(
                "",
                "",
                error.code(),
                error.message(),
                Some("stage=resolve"),
                scenario,
                user_id,
            )
            .await;
    }
}
