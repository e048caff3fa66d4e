//! Audit Sink contract

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Record of one successful AI call, with truncated excerpts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Caller
    pub user_id: String,
    /// Scenario the call was routed for
    pub scenario: String,
    /// Model name
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Leading part of the prompt actually sent
    pub prompt_excerpt: String,
    /// Leading part of the response
    pub response_excerpt: String,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Wall-clock latency
    pub latency_ms: u64,
    /// Caller correlation id
    pub request_id: Option<String>,
    /// When the call finished
    pub timestamp: DateTime<Utc>,
}

/// Structured record of a failed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAuditEntry {
    /// Model name, empty when no model was resolved
    pub model: String,
    /// Provider name, empty when no model was resolved
    pub provider: String,
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
    /// Where it failed (router stage, retry attempts)
    pub stack: Option<String>,
    /// Scenario the call was routed for
    pub scenario: String,
    /// Caller
    pub user_id: String,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

/// Either kind of audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    /// Successful call
    Call(AuditEntry),
    /// Failure
    Error(ErrorAuditEntry),
}

impl AuditRecord {
    fn matches(&self, filter: &AuditFilter) -> bool {
        let (model, provider, user, scenario, is_error) = match self {
            Self::Call(e) => (&e.model, &e.provider, &e.user_id, &e.scenario, false),
            Self::Error(e) => (&e.model, &e.provider, &e.user_id, &e.scenario, true),
        };
        filter.model.as_ref().map_or(true, |m| m == model)
            && filter.provider.as_ref().map_or(true, |p| p == provider)
            && filter.user_id.as_ref().map_or(true, |u| u == user)
            && filter.scenario.as_ref().map_or(true, |s| s == scenario)
            && (!filter.errors_only || is_error)
    }
}

/// Query filter for [`AuditSink::query_logs`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Model name
    pub model: Option<String>,
    /// Provider name
    pub provider: Option<String>,
    /// Caller
    pub user_id: Option<String>,
    /// Scenario
    pub scenario: Option<String>,
    /// Only error records
    pub errors_only: bool,
    /// Newest records to return
    pub limit: Option<usize>,
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record a successful call
    async fn log_ai_call(&self, entry: AuditEntry);

    /// Record a failure
    #[allow(clippy::too_many_arguments)]
    async fn log_error(
        &self,
        model: &str,
        provider: &str,
        code: &str,
        message: &str,
        stack: Option<&str>,
        scenario: &str,
        user_id: &str,
    );

    /// Matching records, oldest first
    async fn query_logs(&self, filter: &AuditFilter) -> Vec<AuditRecord>;
}

/// Cut `text` to at most `max_chars` characters, never splitting a character
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Bounded in-memory audit log; the oldest record is evicted first
#[derive(Debug)]
pub struct InMemoryAuditSink {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemoryAuditSink {
    /// Sink retaining at most `capacity` records
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, record: AuditRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Every retained record, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Retained error records
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorAuditEntry> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Error(e) => Some(e.clone()),
                AuditRecord::Call(_) => None,
            })
            .collect()
    }

    /// Retained call records
    #[must_use]
    pub fn calls(&self) -> Vec<AuditEntry> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Call(e) => Some(e.clone()),
                AuditRecord::Error(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn log_ai_call(&self, entry: AuditEntry) {
        self.push(AuditRecord::Call(entry));
    }

    async fn log_error(
        &self,
        model: &str,
        provider: &str,
        code: &str,
        message: &str,
        stack: Option<&str>,
        scenario: &str,
        user_id: &str,
    ) {
        self.push(AuditRecord::Error(ErrorAuditEntry {
            model: model.to_string(),
            provider: provider.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            stack: stack.map(String::from),
            scenario: scenario.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        }));
    }

    async fn query_logs(&self, filter: &AuditFilter) -> Vec<AuditRecord> {
        let records = self.records.lock();
        let matching: Vec<_> = records.iter().filter(|r| r.matches(filter)).collect();
        let skip = filter
            .limit
            .map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }
}
