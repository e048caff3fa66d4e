//! Usage/Cost Sink contract
//!
//! One immutable [`UsageRecord`] per attempted call, and cost reporting over
//! a time window.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accounting row for one attempted call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record id
    pub id: Uuid,
    /// Caller
    pub user_id: String,
    /// Model name
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Scenario the call was routed for
    pub scenario: String,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// `input_tokens * cost_in + output_tokens * cost_out`
    pub cost: f64,
    /// Wall-clock latency of the call
    pub latency_ms: u64,
    /// Whether the call produced a response
    pub success: bool,
    /// Caller correlation id
    pub request_id: Option<String>,
    /// Caller session id
    pub session_id: Option<String>,
    /// Error code for failed calls
    pub error_code: Option<String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Dimension to group a cost report by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostGroupBy {
    /// `provider:model`
    Model,
    /// Provider
    Provider,
    /// User
    User,
    /// Scenario
    Scenario,
}

/// Totals for one report group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBucket {
    /// Calls recorded
    pub requests: u64,
    /// Failed calls recorded
    pub failures: u64,
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Summed cost
    pub cost: f64,
}

/// Cost report over `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Grouping dimension
    pub group_by: CostGroupBy,
    /// Per-group totals, ordered by group key
    pub groups: BTreeMap<String, CostBucket>,
    /// Totals across groups
    pub total: CostBucket,
}

/// Destination for usage records
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Persist one record
    async fn record_usage(&self, record: UsageRecord);

    /// Aggregate recorded usage in `[start, end)`
    async fn generate_cost_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: CostGroupBy,
    ) -> CostReport;
}

/// Records retained by [`InMemoryUsageSink::new`]
pub const DEFAULT_USAGE_CAPACITY: usize = 100_000;

/// Bounded in-memory usage log; the oldest record is evicted first
///
/// Cost reports only cover retained records.
#[derive(Debug)]
pub struct InMemoryUsageSink {
    records: RwLock<VecDeque<UsageRecord>>,
    capacity: usize,
}

impl Default for InMemoryUsageSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_USAGE_CAPACITY)
    }
}

impl InMemoryUsageSink {
    /// Empty sink with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty sink retaining at most `capacity` records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Every retained record, in arrival order
    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().iter().cloned().collect()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn group_key(record: &UsageRecord, group_by: CostGroupBy) -> String {
    match group_by {
        CostGroupBy::Model => format!("{}:{}", record.provider, record.model),
        CostGroupBy::Provider => record.provider.clone(),
        CostGroupBy::User => record.user_id.clone(),
        CostGroupBy::Scenario => record.scenario.clone(),
    }
}

fn add(bucket: &mut CostBucket, record: &UsageRecord) {
    bucket.requests += 1;
    if !record.success {
        bucket.failures += 1;
    }
    bucket.input_tokens += record.input_tokens;
    bucket.output_tokens += record.output_tokens;
    bucket.cost += record.cost;
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn record_usage(&self, record: UsageRecord) {
        let mut records = self.records.write();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    async fn generate_cost_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: CostGroupBy,
    ) -> CostReport {
        let mut groups: BTreeMap<String, CostBucket> = BTreeMap::new();
        let mut total = CostBucket::default();

        for record in self
            .records
            .read()
            .iter()
            .filter(|r| r.created_at >= start && r.created_at < end)
        {
            add(groups.entry(group_key(record, group_by)).or_default(), record);
            add(&mut total, record);
        }

        CostReport {
            start,
            end,
            group_by,
            groups,
            total,
        }
    }
}
