//! Scenario Selector
//!
//! Picks one model for a scenario from the models currently available.
//! Only models that generate text are considered; embedding-only models are
//! never chosen for `call` or `stream`.
//!
//! # Selection Order
//!
//! 1. Nothing available: the designated local adapter's default model, if the
//!    adapter is registered and reachable; otherwise `PROVIDER_UNAVAILABLE`.
//! 2. No profile for the scenario: best overall model under balanced weights.
//! 3. Candidates: the profile's primary models that are available, else its
//!    available fallback models.
//! 4. Hard constraints filter the candidates; if nothing survives, they are
//!    ignored for this call.
//! 5. Weighted score over min-max normalized quality, 1/cost and 1/latency.
//!    Ties go to the model listed first in the profile.
//! 6. No candidate at all: [`FALLBACK_CASCADE`], in order.
//!
//! Every decision is logged and appended to the [`DecisionLog`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::decision_log::{DecisionLog, SelectionDecision};
use super::scenario::{ScenarioCatalog, ScenarioProfile, ScoringWeights, SelectionStrategy};
use crate::backend::{BackendAdapter, BackendRegistry};
use crate::error::{Result, RouterError};
use crate::registry::{ModelDescriptor, ModelKey};

/// Costs below this are treated as this when inverting
const MIN_COST: f64 = 1e-9;

/// Latencies below this (ms) are treated as this when inverting
const MIN_LATENCY_MS: f64 = 1.0;

/// One last-resort step, tried when a profile yields no candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStep {
    /// Any available model served by the local adapter's provider
    SameProviderAsLocal,
    /// The local adapter's default model, even if the registry lacks it
    LocalDefault,
    /// The first available model
    FirstRegistered,
}

impl FallbackStep {
    fn reason(self) -> &'static str {
        match self {
            Self::SameProviderAsLocal => "fallback cascade: model from the local provider",
            Self::LocalDefault => "fallback cascade: local adapter default model",
            Self::FirstRegistered => "fallback cascade: first registered model",
        }
    }
}

/// Last-resort steps, in the order they are tried
pub const FALLBACK_CASCADE: [FallbackStep; 3] = [
    FallbackStep::SameProviderAsLocal,
    FallbackStep::LocalDefault,
    FallbackStep::FirstRegistered,
];

/// A model with its weighted score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredModel {
    /// The model
    pub model: ModelDescriptor,
    /// Weighted score in `[0, wQ + wC + wL]`
    pub score: f64,
}

/// Min-max normalize; a flat set normalizes to 1.0
fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .iter()
        .map(|v| {
            if range > f64::EPSILON * max.abs().max(1.0) {
                (v - min) / range
            } else {
                1.0
            }
        })
        .collect()
}

/// Score candidates; output order matches input order
#[must_use]
pub fn score_candidates(candidates: &[&ModelDescriptor], weights: &ScoringWeights) -> Vec<f64> {
    let quality: Vec<f64> = candidates.iter().map(|m| f64::from(m.quality)).collect();
    let inv_cost: Vec<f64> = candidates
        .iter()
        .map(|m| 1.0 / m.blended_cost().max(MIN_COST))
        .collect();
    let inv_latency: Vec<f64> = candidates
        .iter()
        .map(|m| 1.0 / (m.avg_latency_ms as f64).max(MIN_LATENCY_MS))
        .collect();

    let (q, c, l) = (normalize(&quality), normalize(&inv_cost), normalize(&inv_latency));
    (0..candidates.len())
        .map(|i| weights.quality * q[i] + weights.cost * c[i] + weights.latency * l[i])
        .collect()
}

/// Highest-scoring candidate; the earliest wins a tie
fn pick_best(candidates: &[&ModelDescriptor], weights: &ScoringWeights) -> Option<ScoredModel> {
    let scores = score_candidates(candidates, weights);
    let mut best: Option<usize> = None;
    for (i, score) in scores.iter().enumerate() {
        if best.map_or(true, |b| *score > scores[b]) {
            best = Some(i);
        }
    }
    best.map(|i| ScoredModel {
        model: candidates[i].clone(),
        score: scores[i],
    })
}

/// Scenario-driven model selector
pub struct ScenarioSelector {
    scenarios: ScenarioCatalog,
    backends: BackendRegistry,
    log: Arc<DecisionLog>,
}

impl ScenarioSelector {
    /// Selector over scenario profiles and registered backends
    #[must_use]
    pub fn new(scenarios: ScenarioCatalog, backends: BackendRegistry, log: Arc<DecisionLog>) -> Self {
        Self {
            scenarios,
            backends,
            log,
        }
    }

    /// Scenario profiles in use
    #[must_use]
    pub fn scenarios(&self) -> &ScenarioCatalog {
        &self.scenarios
    }

    /// Decision log
    #[must_use]
    pub fn decision_log(&self) -> &Arc<DecisionLog> {
        &self.log
    }

    /// Pick a model for `scenario` from `available`
    ///
    /// Fails only when nothing is available and the local adapter is absent
    /// or unreachable.
    pub async fn select_for_scenario(
        &self,
        scenario: &str,
        available: &[ModelDescriptor],
    ) -> Result<ModelDescriptor> {
        let generative = text_models(available);
        let available = generative.as_slice();
        if available.is_empty() {
            return self.select_local_only(scenario).await;
        }

        let Some(profile) = self.scenarios.get(scenario) else {
            let best = self.best_overall(available);
            self.record(
                scenario,
                &best.model,
                Some(SelectionStrategy::Balanced),
                available.len(),
                false,
                "no profile for scenario; best overall model",
                Some(best.score),
            );
            return Ok(best.model);
        };

        let by_key: HashMap<&ModelKey, &ModelDescriptor> =
            available.iter().map(|m| (&m.key, m)).collect();

        let primary = present_in_order(&profile.primary_models, &by_key, &profile.id);
        let (candidates, is_fallback) = if primary.is_empty() {
            (present_in_order(&profile.fallback_models, &by_key, &profile.id), true)
        } else {
            (primary, false)
        };

        if candidates.is_empty() {
            return self.cascade(scenario, profile, available).await;
        }

        let constrained: Vec<&ModelDescriptor> = candidates
            .iter()
            .copied()
            .filter(|m| profile.constraints.admits(m))
            .collect();
        let degraded = constrained.is_empty();
        let pool = if degraded { &candidates } else { &constrained };
        if degraded {
            warn!(
                scenario = %scenario,
                candidates = candidates.len(),
                "Hard constraints excluded every candidate, ignoring them"
            );
        }

        let Some(best) = pick_best(pool, &profile.weights) else {
            return self.cascade(scenario, profile, available).await;
        };

        let reason = match (is_fallback, degraded) {
            (false, false) => "highest score among primary models",
            (false, true) => "highest score among primary models; constraints ignored",
            (true, false) => "no primary model available; highest score among fallback models",
            (true, true) => "no primary model available; fallback models, constraints ignored",
        };
        self.record(
            scenario,
            &best.model,
            Some(profile.strategy),
            pool.len(),
            is_fallback,
            reason,
            Some(best.score),
        );
        Ok(best.model)
    }

    /// What [`select_for_scenario`](Self::select_for_scenario) would pick, without
    /// appending to the decision log
    pub async fn preview_for_scenario(
        &self,
        scenario: &str,
        available: &[ModelDescriptor],
    ) -> Result<ModelDescriptor> {
        let scratch = Self {
            scenarios: self.scenarios.clone(),
            backends: self.backends.clone(),
            log: Arc::new(DecisionLog::new(1)),
        };
        scratch.select_for_scenario(scenario, available).await
    }

    /// Best model overall under balanced weights, `None` only for an empty slice
    ///
    /// Ties go to the smallest `provider:model` key, so the result does not
    /// depend on slice order.
    #[must_use]
    pub fn select_best(&self, available: &[ModelDescriptor]) -> Option<ModelDescriptor> {
        let generative = text_models(available);
        if generative.is_empty() {
            return None;
        }
        Some(self.best_overall(&generative).model)
    }

    fn best_overall(&self, available: &[ModelDescriptor]) -> ScoredModel {
        let mut ordered: Vec<&ModelDescriptor> = available.iter().collect();
        ordered.sort_by(|a, b| a.key.cmp(&b.key));
        ordered.dedup_by(|a, b| a.key == b.key);
        // Non-empty by the callers' checks
        pick_best(&ordered, &SelectionStrategy::Balanced.default_weights()).unwrap_or_else(|| {
            ScoredModel {
                model: available[0].clone(),
                score: 0.0,
            }
        })
    }

    /// No text model in the registry: the local adapter is the only hope
    async fn select_local_only(&self, scenario: &str) -> Result<ModelDescriptor> {
        let Some(local) = self.backends.local() else {
            warn!(scenario = %scenario, "No text model available and no local adapter registered");
            return Err(RouterError::unavailable(
                "no models available and no local adapter registered",
            ));
        };

        if !local.health_check().await {
            warn!(
                scenario = %scenario,
                provider = %local.provider(),
                "No text model available and local adapter unreachable"
            );
            return Err(RouterError::unavailable(format!(
                "no models available and local provider '{}' is unreachable",
                local.provider()
            )));
        }

        let Some(model) = local_default(local.as_ref()).await else {
            return Err(RouterError::unavailable(format!(
                "local provider '{}' has no default model",
                local.provider()
            )));
        };

        self.record(
            scenario,
            &model,
            None,
            0,
            true,
            "no text model available; local adapter default model",
            None,
        );
        Ok(model)
    }

    /// Walk [`FALLBACK_CASCADE`]; `available` is non-empty here
    async fn cascade(
        &self,
        scenario: &str,
        profile: &ScenarioProfile,
        available: &[ModelDescriptor],
    ) -> Result<ModelDescriptor> {
        let local = self.backends.local();

        for step in FALLBACK_CASCADE {
            let chosen = match step {
                FallbackStep::SameProviderAsLocal => self
                    .backends
                    .local_provider()
                    .and_then(|p| available.iter().find(|m| m.provider() == p))
                    .cloned(),
                FallbackStep::LocalDefault => match &local {
                    Some(adapter) => local_default(adapter.as_ref()).await,
                    None => None,
                },
                FallbackStep::FirstRegistered => available.first().cloned(),
            };

            if let Some(model) = chosen {
                self.record(
                    scenario,
                    &model,
                    Some(profile.strategy),
                    0,
                    true,
                    step.reason(),
                    None,
                );
                return Ok(model);
            }
            debug!(scenario = %scenario, step = ?step, "Fallback step produced nothing");
        }

        Err(RouterError::unavailable(format!(
            "no model could be selected for scenario '{scenario}'"
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        scenario: &str,
        model: &ModelDescriptor,
        strategy: Option<SelectionStrategy>,
        candidate_count: usize,
        is_fallback: bool,
        reason: &str,
        score: Option<f64>,
    ) {
        if is_fallback {
            info!(
                scenario = %scenario,
                model = %model.key,
                strategy = ?strategy,
                candidates = candidate_count,
                reason = %reason,
                "Fallback model selected"
            );
        } else {
            debug!(
                scenario = %scenario,
                model = %model.key,
                strategy = ?strategy,
                candidates = candidate_count,
                score = ?score,
                reason = %reason,
                "Model selected"
            );
        }

        self.log.record(SelectionDecision {
            scenario: scenario.to_string(),
            model: model.clone(),
            strategy,
            candidate_count,
            is_fallback,
            reason: reason.to_string(),
            score,
            timestamp: Utc::now(),
        });
    }
}

/// The models in `available` that can generate text
fn text_models(available: &[ModelDescriptor]) -> Vec<ModelDescriptor> {
    available
        .iter()
        .filter(|m| m.generates_text())
        .cloned()
        .collect()
}

/// Profile ids present in `available`, in profile order, without duplicates
fn present_in_order<'a>(
    ids: &[String],
    by_key: &HashMap<&ModelKey, &'a ModelDescriptor>,
    scenario: &str,
) -> Vec<&'a ModelDescriptor> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter_map(|id| match ModelKey::parse(id) {
            Ok(key) => Some(key),
            Err(_) => {
                warn!(scenario = %scenario, model = %id, "Ignoring malformed model id in profile");
                None
            }
        })
        .filter_map(|key| by_key.get(&key).copied())
        .filter(|m| seen.insert(m.key.clone()))
        .collect()
}

/// Descriptor for the local adapter's default model
async fn local_default(adapter: &dyn BackendAdapter) -> Option<ModelDescriptor> {
    let name = adapter.default_model()?.to_string();
    match adapter.model_info(&name).await {
        Ok(Some(model)) => Some(model),
        Ok(None) => Some(ModelDescriptor::new(adapter.provider(), name)),
        Err(e) => {
            debug!(provider = %adapter.provider(), error = %e, "Default model info unavailable");
            Some(ModelDescriptor::new(adapter.provider(), name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelFeature;
    use crate::routing::scenario::HardConstraints;
    use crate::routing::test_utils::MockAdapter;
    use pretty_assertions::assert_eq;

    fn model_a() -> ModelDescriptor {
        ModelDescriptor::new("vendor", "a")
            .with_quality(9)
            .with_costs(0.001, 0.001)
            .with_latency_ms(2000)
    }

    fn model_b() -> ModelDescriptor {
        ModelDescriptor::new("vendor", "b")
            .with_quality(6)
            .with_costs(0.0001, 0.0001)
            .with_latency_ms(500)
    }

    fn selector(scenarios: ScenarioCatalog, backends: BackendRegistry) -> ScenarioSelector {
        ScenarioSelector::new(scenarios, backends, Arc::new(DecisionLog::new(100)))
    }

    fn ab_profile(strategy: SelectionStrategy, weights: ScoringWeights) -> ScenarioProfile {
        ScenarioProfile::new("s", strategy)
            .with_primary(["vendor:a", "vendor:b"])
            .with_weights(weights)
    }

    #[test]
    fn test_normalize_flat_set_is_one() {
        assert_eq!(normalize(&[3.0, 3.0]), vec![1.0, 1.0]);
        assert_eq!(normalize(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_scores_for_cost_and_quality_weights() {
        let (a, b) = (model_a(), model_b());
        let scores = score_candidates(&[&a, &b], &ScoringWeights::new(0.2, 0.6, 0.2));
        assert!((scores[0] - 0.2).abs() < 1e-9);
        assert!((scores[1] - 0.8).abs() < 1e-9);

        let scores = score_candidates(&[&a, &b], &ScoringWeights::new(0.8, 0.1, 0.1));
        assert!((scores[0] - 0.8).abs() < 1e-9);
        assert!((scores[1] - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cost_strategy_picks_cheap_model() {
        let scenarios = ScenarioCatalog::empty()
            .with_profile(ab_profile(SelectionStrategy::Cost, ScoringWeights::new(0.2, 0.6, 0.2)));
        let selector = selector(scenarios, BackendRegistry::new());

        let chosen = selector.select_for_scenario("s", &[model_a(), model_b()]).await.unwrap();
        assert_eq!(chosen.id(), "vendor:b");

        let decision = &selector.decision_log().recent(1)[0];
        assert_eq!(decision.strategy, Some(SelectionStrategy::Cost));
        assert_eq!(decision.candidate_count, 2);
        assert!(!decision.is_fallback);
    }

    #[tokio::test]
    async fn test_quality_strategy_picks_strong_model() {
        let scenarios = ScenarioCatalog::empty().with_profile(ab_profile(
            SelectionStrategy::Quality,
            ScoringWeights::new(0.8, 0.1, 0.1),
        ));
        let selector = selector(scenarios, BackendRegistry::new());

        let chosen = selector.select_for_scenario("s", &[model_b(), model_a()]).await.unwrap();
        assert_eq!(chosen.id(), "vendor:a");
    }

    #[tokio::test]
    async fn test_tie_goes_to_profile_order() {
        let scenarios = ScenarioCatalog::empty().with_profile(
            ScenarioProfile::new("s", SelectionStrategy::Balanced).with_primary(["p:y", "p:x"]),
        );
        let selector = selector(scenarios, BackendRegistry::new());
        let x = ModelDescriptor::new("p", "x").with_quality(5);
        let y = ModelDescriptor::new("p", "y").with_quality(5);

        for available in [vec![x.clone(), y.clone()], vec![y.clone(), x.clone()]] {
            let chosen = selector.select_for_scenario("s", &available).await.unwrap();
            assert_eq!(chosen.id(), "p:y");
        }
    }

    #[tokio::test]
    async fn test_fallback_list_when_no_primary_available() {
        let scenarios = ScenarioCatalog::empty().with_profile(
            ScenarioProfile::new("s", SelectionStrategy::Quality)
                .with_primary(["gone:model"])
                .with_fallback(["vendor:b", "vendor:a"]),
        );
        let selector = selector(scenarios, BackendRegistry::new());

        let chosen = selector.select_for_scenario("s", &[model_a(), model_b()]).await.unwrap();
        assert_eq!(chosen.id(), "vendor:a");
        assert!(selector.decision_log().recent(1)[0].is_fallback);
    }

    #[tokio::test]
    async fn test_constraints_filter_then_soft_degrade() {
        let strict = ScenarioProfile::new("strict", SelectionStrategy::Quality)
            .with_primary(["vendor:a", "vendor:b"])
            .with_constraints(HardConstraints {
                max_latency_ms: Some(1000),
                ..HardConstraints::default()
            });
        let impossible = ScenarioProfile::new("impossible", SelectionStrategy::Quality)
            .with_primary(["vendor:a", "vendor:b"])
            .with_constraints(HardConstraints {
                min_quality: Some(10),
                ..HardConstraints::default()
            });
        let selector = selector(
            ScenarioCatalog::empty().with_profile(strict).with_profile(impossible),
            BackendRegistry::new(),
        );
        let available = [model_a(), model_b()];

        // a is too slow, so the quality strategy settles for b
        let chosen = selector.select_for_scenario("strict", &available).await.unwrap();
        assert_eq!(chosen.id(), "vendor:b");

        // Nothing meets min_quality 10; constraints are dropped and a wins on quality
        let chosen = selector.select_for_scenario("impossible", &available).await.unwrap();
        assert_eq!(chosen.id(), "vendor:a");
        assert!(selector.decision_log().recent(1)[0].reason.contains("constraints ignored"));
    }

    #[tokio::test]
    async fn test_unknown_scenario_uses_best_overall() {
        let selector = selector(ScenarioCatalog::empty(), BackendRegistry::new());
        let available = [model_a(), model_b()];
        let chosen = selector.select_for_scenario("nope", &available).await.unwrap();
        assert_eq!(Some(chosen), selector.select_best(&available));
        assert!(selector.select_best(&[]).is_none());
    }

    #[tokio::test]
    async fn test_cascade_prefers_local_provider_models() {
        let scenarios = ScenarioCatalog::empty().with_profile(
            ScenarioProfile::new("s", SelectionStrategy::Quality).with_primary(["gone:model"]),
        );
        let backends = BackendRegistry::new()
            .with_adapter(Arc::new(MockAdapter::new("ollama").with_default_model("llama3.2")))
            .with_local_provider("ollama");
        let selector = selector(scenarios, backends);

        let local_model = ModelDescriptor::new("ollama", "qwen2.5");
        let chosen = selector
            .select_for_scenario("s", &[model_a(), local_model])
            .await
            .unwrap();
        assert_eq!(chosen.id(), "ollama:qwen2.5");

        // No local-provider model available: the local default is used directly
        let chosen = selector.select_for_scenario("s", &[model_a()]).await.unwrap();
        assert_eq!(chosen.id(), "ollama:llama3.2");
        let decision = &selector.decision_log().recent(1)[0];
        assert!(decision.is_fallback);
        assert_eq!(decision.reason, FallbackStep::LocalDefault.reason());
    }

    #[tokio::test]
    async fn test_cascade_ends_with_first_registered() {
        let scenarios = ScenarioCatalog::empty().with_profile(
            ScenarioProfile::new("s", SelectionStrategy::Cost).with_primary(["gone:model"]),
        );
        let selector = selector(scenarios, BackendRegistry::new());

        let chosen = selector.select_for_scenario("s", &[model_b(), model_a()]).await.unwrap();
        assert_eq!(chosen.id(), "vendor:b");
        assert_eq!(
            selector.decision_log().recent(1)[0].reason,
            FallbackStep::FirstRegistered.reason()
        );
    }

    #[tokio::test]
    async fn test_empty_registry_uses_reachable_local_adapter() {
        let local = MockAdapter::new("ollama").with_default_model("llama3.2");
        let backends = BackendRegistry::new()
            .with_adapter(Arc::new(local))
            .with_local_provider("ollama");
        let selector = selector(ScenarioCatalog::builtin(), backends);

        let chosen = selector.select_for_scenario("chat", &[]).await.unwrap();
        assert_eq!(chosen.id(), "ollama:llama3.2");
        assert!(selector.decision_log().recent(1)[0].is_fallback);
    }

    #[tokio::test]
    async fn test_empty_registry_without_local_adapter_fails() {
        let selector = selector(ScenarioCatalog::builtin(), BackendRegistry::new().with_local_provider("ollama"));
        let err = selector.select_for_scenario("chat", &[]).await.unwrap_err();
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
        assert!(err.is_retryable());
        assert!(selector.decision_log().is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_with_unreachable_local_adapter_fails() {
        let local = MockAdapter::new("ollama").with_default_model("llama3.2").unhealthy();
        let backends = BackendRegistry::new()
            .with_adapter(Arc::new(local))
            .with_local_provider("ollama");
        let selector = selector(ScenarioCatalog::builtin(), backends);

        let err = selector.select_for_scenario("chat", &[]).await.unwrap_err();
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
    }

    fn embedder(provider: &str) -> ModelDescriptor {
        ModelDescriptor::new(provider, "embed")
            .with_quality(9)
            .with_costs(0.0, 0.0)
            .with_latency_ms(50)
            .with_feature(ModelFeature::Embeddings)
    }

    fn chat_model(provider: &str, name: &str) -> ModelDescriptor {
        ModelDescriptor::new(provider, name)
            .with_quality(5)
            .with_latency_ms(1500)
            .with_feature(ModelFeature::Chat)
    }

    #[tokio::test]
    async fn test_embedding_models_never_chosen_for_text() {
        let selector = selector(ScenarioCatalog::empty(), BackendRegistry::new());
        let available = [embedder("ollama"), chat_model("ollama", "llama3.2")];

        let chosen = selector.select_for_scenario("summarize", &available).await.unwrap();
        assert_eq!(chosen.id(), "ollama:llama3.2");
        assert_eq!(selector.select_best(&available).unwrap().id(), "ollama:llama3.2");
        assert_eq!(selector.select_best(&[embedder("ollama")]), None);
    }

    #[tokio::test]
    async fn test_profile_listing_an_embedder_skips_it() {
        let scenarios = ScenarioCatalog::empty().with_profile(
            ScenarioProfile::new("s", SelectionStrategy::Latency)
                .with_primary(["vendor:embed"])
                .with_fallback(["vendor:chat"]),
        );
        let selector = selector(scenarios, BackendRegistry::new());

        let chosen = selector
            .select_for_scenario("s", &[embedder("vendor"), chat_model("vendor", "chat")])
            .await
            .unwrap();
        assert_eq!(chosen.id(), "vendor:chat");
        assert!(selector.decision_log().recent(1)[0].is_fallback);
    }

    #[tokio::test]
    async fn test_cascade_skips_local_embedding_models() {
        let scenarios = ScenarioCatalog::empty().with_profile(
            ScenarioProfile::new("s", SelectionStrategy::Quality).with_primary(["gone:model"]),
        );
        let backends = BackendRegistry::new()
            .with_adapter(Arc::new(MockAdapter::new("ollama").with_default_model("llama3.2")))
            .with_local_provider("ollama");
        let selector = selector(scenarios, backends);

        let chosen = selector
            .select_for_scenario("s", &[embedder("ollama"), model_a()])
            .await
            .unwrap();
        assert_eq!(chosen.id(), "ollama:llama3.2");
        assert_eq!(
            selector.decision_log().recent(1)[0].reason,
            FallbackStep::LocalDefault.reason()
        );
    }

    #[tokio::test]
    async fn test_only_embedders_available_goes_to_local_adapter() {
        let backends = BackendRegistry::new()
            .with_adapter(Arc::new(MockAdapter::new("ollama").with_default_model("llama3.2")))
            .with_local_provider("ollama");
        let selector = selector(ScenarioCatalog::builtin(), backends);

        let chosen = selector
            .select_for_scenario("chat", &[embedder("ollama")])
            .await
            .unwrap();
        assert_eq!(chosen.id(), "ollama:llama3.2");
    }

    #[tokio::test]
    async fn test_preview_leaves_decision_log_untouched() {
        let scenarios = ScenarioCatalog::empty()
            .with_profile(ab_profile(SelectionStrategy::Cost, ScoringWeights::new(0.2, 0.6, 0.2)));
        let selector = selector(scenarios, BackendRegistry::new());

        let previewed = selector
            .preview_for_scenario("s", &[model_a(), model_b()])
            .await
            .unwrap();
        assert_eq!(previewed.id(), "vendor:b");
        assert!(selector.decision_log().is_empty());
        assert_eq!(selector.decision_log().statistics().total_selections, 0);

        let chosen = selector.select_for_scenario("s", &[model_a(), model_b()]).await.unwrap();
        assert_eq!(chosen, previewed);
        assert_eq!(selector.decision_log().len(), 1);
    }
}
