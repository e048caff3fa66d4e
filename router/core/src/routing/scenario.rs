//! Scenario profiles
//!
//! A scenario names a use-case ("resume_analysis", "quick_reply") and carries
//! the selection policy for it: a strategy, ordered primary and fallback
//! model ids, scoring weights and optional hard constraints.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::registry::ModelDescriptor;

/// Weighting scheme for ranking candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Favor quality rating
    Quality,
    /// Favor low per-token cost
    Cost,
    /// Favor low latency
    Latency,
    /// Equal weights
    #[default]
    Balanced,
}

impl SelectionStrategy {
    /// Default weights for the strategy
    #[must_use]
    pub fn default_weights(self) -> ScoringWeights {
        match self {
            Self::Quality => ScoringWeights::new(0.7, 0.15, 0.15),
            Self::Cost => ScoringWeights::new(0.2, 0.6, 0.2),
            Self::Latency => ScoringWeights::new(0.2, 0.2, 0.6),
            Self::Balanced => ScoringWeights::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
        }
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Cost => "cost",
            Self::Latency => "latency",
            Self::Balanced => "balanced",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "cost" => Ok(Self::Cost),
            "latency" => Ok(Self::Latency),
            "balanced" => Ok(Self::Balanced),
            other => Err(RouterError::invalid(format!("unknown strategy '{other}'"))),
        }
    }
}

/// Relative importance of quality, cost and latency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight on normalized quality
    pub quality: f64,
    /// Weight on normalized inverse cost
    pub cost: f64,
    /// Weight on normalized inverse latency
    pub latency: f64,
}

impl ScoringWeights {
    /// Create weights
    #[must_use]
    pub const fn new(quality: f64, cost: f64, latency: f64) -> Self {
        Self {
            quality,
            cost,
            latency,
        }
    }

    /// All weights finite and non-negative
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.quality, self.cost, self.latency]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        SelectionStrategy::Balanced.default_weights()
    }
}

/// Limits a candidate must meet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HardConstraints {
    /// Reject models slower than this
    pub max_latency_ms: Option<u64>,
    /// Reject models whose blended per-token cost exceeds this
    pub max_cost_per_token: Option<f64>,
    /// Reject models rated below this
    pub min_quality: Option<u8>,
}

impl HardConstraints {
    /// Whether any limit is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_latency_ms.is_none() && self.max_cost_per_token.is_none() && self.min_quality.is_none()
    }

    /// Whether a model meets every set limit
    #[must_use]
    pub fn admits(&self, model: &ModelDescriptor) -> bool {
        self.max_latency_ms.map_or(true, |max| model.avg_latency_ms <= max)
            && self
                .max_cost_per_token
                .map_or(true, |max| model.blended_cost() <= max)
            && self.min_quality.map_or(true, |min| model.quality >= min)
    }
}

/// Selection policy for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioProfile {
    /// Scenario id
    pub id: String,
    /// Strategy name, recorded with each decision
    pub strategy: SelectionStrategy,
    /// Preferred `provider:model` ids, in tie-break order
    pub primary_models: Vec<String>,
    /// Ids considered only when no primary model is available
    pub fallback_models: Vec<String>,
    /// Scoring weights
    pub weights: ScoringWeights,
    /// Hard limits
    pub constraints: HardConstraints,
}

impl ScenarioProfile {
    /// Profile with the strategy's default weights and no models
    pub fn new(id: impl Into<String>, strategy: SelectionStrategy) -> Self {
        Self {
            id: id.into(),
            strategy,
            primary_models: Vec::new(),
            fallback_models: Vec::new(),
            weights: strategy.default_weights(),
            constraints: HardConstraints::default(),
        }
    }

    /// Set primary models
    #[must_use]
    pub fn with_primary<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_models = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set fallback models
    #[must_use]
    pub fn with_fallback<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_models = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Override weights
    #[must_use]
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set hard constraints
    #[must_use]
    pub fn with_constraints(mut self, constraints: HardConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Scenario id to profile
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    profiles: HashMap<String, ScenarioProfile>,
}

impl ScenarioCatalog {
    /// No profiles; every scenario falls through to best-overall selection
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in profiles for the job-application workflow
    #[must_use]
    pub fn builtin() -> Self {
        use SelectionStrategy::{Balanced, Cost, Latency, Quality};

        let mut catalog = Self::empty();
        catalog.insert(
            ScenarioProfile::new("chat", Balanced)
                .with_primary(["openai:gpt-4o-mini", "anthropic:claude-3-5-haiku", "deepseek:deepseek-chat"])
                .with_fallback(["ollama:llama3.2"]),
        );
        catalog.insert(
            ScenarioProfile::new("resume_analysis", Quality)
                .with_primary(["openai:gpt-4o", "anthropic:claude-3-5-sonnet", "google:gemini-1.5-pro"])
                .with_fallback(["openai:gpt-4o-mini", "deepseek:deepseek-chat", "ollama:llama3.2"])
                .with_constraints(HardConstraints {
                    min_quality: Some(7),
                    ..HardConstraints::default()
                }),
        );
        catalog.insert(
            ScenarioProfile::new("job_matching", Quality)
                .with_primary(["anthropic:claude-3-5-sonnet", "openai:gpt-4o"])
                .with_fallback(["openai:gpt-4o-mini", "ollama:llama3.2"]),
        );
        catalog.insert(
            ScenarioProfile::new("cover_letter", Balanced)
                .with_primary(["openai:gpt-4o", "anthropic:claude-3-5-sonnet", "openai:gpt-4o-mini"])
                .with_fallback(["deepseek:deepseek-chat", "ollama:llama3.2"]),
        );
        catalog.insert(
            ScenarioProfile::new("keyword_extraction", Cost)
                .with_primary(["openai:gpt-4o-mini", "google:gemini-1.5-flash", "deepseek:deepseek-chat"])
                .with_fallback(["ollama:llama3.2"]),
        );
        catalog.insert(
            ScenarioProfile::new("quick_reply", Latency)
                .with_primary(["google:gemini-1.5-flash", "anthropic:claude-3-5-haiku", "openai:gpt-4o-mini"])
                .with_fallback(["ollama:llama3.2"])
                .with_constraints(HardConstraints {
                    max_latency_ms: Some(1500),
                    ..HardConstraints::default()
                }),
        );
        catalog
    }

    /// Add or replace a profile
    pub fn insert(&mut self, profile: ScenarioProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Builder form of [`insert`](Self::insert)
    #[must_use]
    pub fn with_profile(mut self, profile: ScenarioProfile) -> Self {
        self.insert(profile);
        self
    }

    /// Profile for a scenario
    #[must_use]
    pub fn get(&self, scenario: &str) -> Option<&ScenarioProfile> {
        self.profiles.get(scenario)
    }

    /// Scenario ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.profiles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of profiles
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether there are no profiles
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
