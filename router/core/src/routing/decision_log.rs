//! Selection decision log
//!
//! Append-only, bounded, oldest-evicted record of every model selection.
//! Observability only: nothing reads it to make a decision.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::scenario::SelectionStrategy;
use crate::registry::ModelDescriptor;

/// One selection made by the scenario selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDecision {
    /// Scenario requested
    pub scenario: String,
    /// Chosen model
    pub model: ModelDescriptor,
    /// Strategy used; `None` for cascade picks that did not score
    pub strategy: Option<SelectionStrategy>,
    /// Candidates considered
    pub candidate_count: usize,
    /// Whether a fallback path produced this choice
    pub is_fallback: bool,
    /// Why this model
    pub reason: String,
    /// Winning score, when candidates were scored
    pub score: Option<f64>,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
}

/// Per-scenario counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCounts {
    /// Selections made
    pub selections: u64,
    /// Selections that were fallbacks
    pub fallbacks: u64,
}

/// Aggregates over the retained decision window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionStatistics {
    /// Decisions retained
    pub total_selections: u64,
    /// Retained decisions that were fallbacks
    pub fallback_selections: u64,
    /// `fallback_selections / total_selections`, 0 when empty
    pub fallback_rate: f64,
    /// Counts by scenario
    pub per_scenario: BTreeMap<String, ScenarioCounts>,
    /// Counts by `provider:model`
    pub per_model: BTreeMap<String, u64>,
}

/// Bounded decision log
#[derive(Debug)]
pub struct DecisionLog {
    entries: Mutex<VecDeque<SelectionDecision>>,
    capacity: usize,
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl DecisionLog {
    /// Log retaining at most `capacity` decisions
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    /// Append a decision, evicting the oldest when full
    pub fn record(&self, decision: SelectionDecision) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(decision);
    }

    /// Up to `limit` most recent decisions, oldest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<SelectionDecision> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Decisions retained
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum retained decisions
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Aggregate counts over the retained window
    #[must_use]
    pub fn statistics(&self) -> SelectionStatistics {
        let entries = self.entries.lock();
        let mut stats = SelectionStatistics::default();

        for decision in entries.iter() {
            stats.total_selections += 1;
            let scenario = stats
                .per_scenario
                .entry(decision.scenario.clone())
                .or_default();
            scenario.selections += 1;
            if decision.is_fallback {
                stats.fallback_selections += 1;
                scenario.fallbacks += 1;
            }
            *stats.per_model.entry(decision.model.id()).or_default() += 1;
        }

        if stats.total_selections > 0 {
            stats.fallback_rate = stats.fallback_selections as f64 / stats.total_selections as f64;
        }
        stats
    }
}
