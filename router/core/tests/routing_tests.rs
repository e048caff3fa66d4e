//! End-to-End Routing Scenarios
//!
//! These tests drive the public surface of `router_core` against a scripted
//! adapter. No network access is needed.
//!
//! # Test Categories
//!
//! 1. Selection - Profile candidates, scoring, permutation stability
//! 2. Validation - Rejection before any selection or dispatch
//! 3. Retry - Invocation counts for transient failures
//! 4. Accounting - Exact cost, one record per executed call
//! 5. Streaming - Deadline truncation
//! 6. Registry - Snapshot isolation and generation order under concurrent reloads

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use router_core::collaborators::{
    ConfigStore, InMemoryPerformanceSink, InMemoryUsageSink, StoredModelConfig,
};
use router_core::routing::{DecisionLog, HardConstraints, ScoringWeights};
use router_core::{
    AiRequest, AiResponse, BackendAdapter, BackendRegistry, ModelDescriptor, RequestRouter,
    Result, RetryConfig, RetryExecutor, RouteContext, RouterError, ScenarioCatalog,
    ScenarioProfile, ScenarioSelector, SelectionStrategy, StaticCatalog, StreamChunk, StreamState,
    TokenUsage,
};

// ============================================================================
// Scripted adapter
// ============================================================================

/// Adapter with scripted failures and an optional never-ending stream
struct ScriptedAdapter {
    provider: String,
    fail_first: AtomicUsize,
    hang_streams: bool,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            fail_first: AtomicUsize::new(0),
            hang_streams: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    fn hanging(mut self) -> Self {
        self.hang_streams = true;
        self
    }
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn call(&self, request: &AiRequest) -> Result<AiResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(RouterError::backend("transient", true));
        }
        Ok(AiResponse {
            content: "ok".to_string(),
            usage: TokenUsage::new(1_000, 250),
            model: request.model.clone().unwrap_or_default(),
            provider: self.provider.clone(),
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn stream(&self, _request: &AiRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        let (tx, rx) = mpsc::channel(8);
        let hang = self.hang_streams;
        tokio::spawn(async move {
            for word in ["one ", "two ", "three"] {
                if tx.send(StreamChunk::Delta(word.to_string())).await.is_err() {
                    return;
                }
            }
            if hang {
                tx.closed().await;
            } else {
                let _ = tx
                    .send(StreamChunk::Done {
                        usage: None,
                        finish_reason: None,
                    })
                    .await;
            }
        });
        Ok(rx)
    }

    async fn model_info(&self, name: &str) -> Result<Option<ModelDescriptor>> {
        Ok(Some(ModelDescriptor::new(self.provider.clone(), name)))
    }

    async fn embed(&self, _text: &str, _model: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }
}

fn model(name: &str, quality: u8, cost: f64, latency_ms: u64) -> ModelDescriptor {
    ModelDescriptor::new("mock", name)
        .with_quality(quality)
        .with_costs(cost, cost)
        .with_latency_ms(latency_ms)
}

fn selector(catalog: ScenarioCatalog) -> ScenarioSelector {
    ScenarioSelector::new(catalog, BackendRegistry::new(), Arc::new(DecisionLog::default()))
}

// ============================================================================
// Test Scenario 1: Selection
// ============================================================================

/// Scenario: cost and quality strategies pick opposite ends of a trade-off
///
/// A is slow, expensive and good; B is fast, cheap and worse.
#[tokio::test]
async fn scenario_strategy_trade_off() {
    let a = model("a", 9, 0.001, 2000);
    let b = model("b", 6, 0.0001, 500);
    let available = vec![a.clone(), b.clone()];

    let catalog = ScenarioCatalog::empty()
        .with_profile(
            ScenarioProfile::new("cheap", SelectionStrategy::Cost)
                .with_primary(["mock:a", "mock:b"])
                .with_weights(ScoringWeights::new(0.2, 0.6, 0.2)),
        )
        .with_profile(
            ScenarioProfile::new("best", SelectionStrategy::Quality)
                .with_primary(["mock:a", "mock:b"])
                .with_weights(ScoringWeights::new(0.8, 0.1, 0.1)),
        );
    let selector = selector(catalog);

    let cheap = selector.select_for_scenario("cheap", &available).await.unwrap();
    let best = selector.select_for_scenario("best", &available).await.unwrap();

    assert_eq!(cheap.key, b.key);
    assert_eq!(best.key, a.key);
}

/// Scenario: a profile with surviving candidates always picks one of the
/// available models, whatever subset is available
#[tokio::test]
async fn scenario_selection_stays_within_available() {
    let pool: Vec<ModelDescriptor> = (0..8_u32)
        .map(|i| {
            model(
                &format!("m{i}"),
                (i % 10) as u8,
                0.0001 * f64::from(i + 1),
                300 * u64::from(i + 1),
            )
        })
        .collect();
    let ids: Vec<String> = pool.iter().map(ModelDescriptor::id).collect();

    let catalog = ScenarioCatalog::empty().with_profile(
        ScenarioProfile::new("s", SelectionStrategy::Balanced)
            .with_primary(ids[..4].to_vec())
            .with_fallback(ids[4..].to_vec())
            .with_constraints(HardConstraints {
                min_quality: Some(3),
                ..HardConstraints::default()
            }),
    );
    let selector = selector(catalog);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        let mut available: Vec<ModelDescriptor> = pool
            .iter()
            .filter(|_| rng.gen_bool(0.5))
            .cloned()
            .collect();
        if available.is_empty() {
            continue;
        }
        available.shuffle(&mut rng);

        let chosen = selector.select_for_scenario("s", &available).await.unwrap();
        assert!(
            available.iter().any(|m| m.key == chosen.key),
            "{} not among available",
            chosen.key
        );
    }
}

/// Scenario: the winner does not depend on the order candidates arrive in
#[tokio::test]
async fn scenario_scoring_is_order_independent() {
    let pool = vec![
        model("a", 9, 0.003, 2500),
        model("b", 7, 0.0008, 900),
        model("c", 5, 0.0002, 400),
        model("d", 8, 0.001, 1200),
    ];
    let catalog = ScenarioCatalog::empty().with_profile(
        ScenarioProfile::new("s", SelectionStrategy::Balanced)
            .with_primary(["mock:a", "mock:b", "mock:c", "mock:d"]),
    );
    let selector = selector(catalog);

    let expected = selector.select_for_scenario("s", &pool).await.unwrap().key;
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let mut shuffled = pool.clone();
        shuffled.shuffle(&mut rng);
        let chosen = selector.select_for_scenario("s", &shuffled).await.unwrap();
        assert_eq!(chosen.key, expected);
    }
}

// ============================================================================
// Test Scenario 2: Validation and empty registry
// ============================================================================

/// Scenario: an out-of-range temperature never reaches selection
#[tokio::test]
async fn scenario_invalid_temperature_rejected_first() {
    let adapter = Arc::new(ScriptedAdapter::new("mock"));
    let router = RequestRouter::builder()
        .catalog(StaticCatalog::empty().with_entry(model("a", 5, 0.001, 100)))
        .backends(BackendRegistry::new().with_adapter(adapter.clone()))
        .build();
    router.reload_models().await;

    let err = router
        .call(
            AiRequest::new("hello").with_temperature(3.0),
            &RouteContext::new("u", "chat"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_REQUEST");
    assert!(!err.is_retryable());
    assert_eq!(router.get_selection_statistics().total_selections, 0);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

/// Scenario: nothing registered and no local adapter
#[tokio::test]
async fn scenario_empty_registry_without_local_adapter() {
    let adapter = Arc::new(ScriptedAdapter::new("mock"));
    let usage = Arc::new(InMemoryUsageSink::new());
    let router = RequestRouter::builder()
        .catalog(StaticCatalog::empty())
        .backends(BackendRegistry::new().with_adapter(adapter.clone()))
        .usage_sink(usage.clone())
        .build();
    router.reload_models().await;

    let err = router
        .call(AiRequest::new("hello"), &RouteContext::new("u", "chat"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
    assert!(err.is_retryable());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    assert!(usage.is_empty());
}

// ============================================================================
// Test Scenario 3: Retry
// ============================================================================

/// Scenario: N-1 transient failures then success
#[tokio::test(start_paused = true)]
async fn scenario_retry_invocation_counts() {
    let config = RetryConfig {
        max_retries: 4,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        ..RetryConfig::default()
    };

    for n in 1..=5_u32 {
        let invocations = AtomicU64::new(0);
        let executor = RetryExecutor::new(config.clone());
        let result = executor
            .execute_with_retry(|| {
                let attempt = invocations.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < u64::from(n) {
                        Err(RouterError::unavailable("flaky"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        tokio_test::assert_ok!(&result);
        assert_eq!(invocations.load(Ordering::SeqCst), u64::from(n));
    }

    let invocations = AtomicU64::new(0);
    let result: Result<()> = RetryExecutor::new(RetryConfig::no_retry())
        .execute_with_retry(|| {
            invocations.fetch_add(1, Ordering::SeqCst);
            async { Err(RouterError::unavailable("down")) }
        })
        .await;
    assert_eq!(result.unwrap_err(), RouterError::unavailable("down"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

/// Scenario: transient failures through the router are retried and
/// accounted once
#[tokio::test(start_paused = true)]
async fn scenario_router_retries_then_accounts_once() {
    let adapter = Arc::new(ScriptedAdapter::new("mock").failing_first(2));
    let usage = Arc::new(InMemoryUsageSink::new());
    let performance = Arc::new(InMemoryPerformanceSink::new());
    let router = RequestRouter::builder()
        .catalog(StaticCatalog::empty().with_entry(model("a", 5, 0.001, 100)))
        .backends(BackendRegistry::new().with_adapter(adapter.clone()))
        .usage_sink(usage.clone())
        .performance_sink(performance.clone())
        .build();
    router.reload_models().await;

    router
        .call(AiRequest::new("hello"), &RouteContext::new("u", "chat"))
        .await
        .unwrap();

    assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    assert_eq!(usage.len(), 1);
    assert_eq!(performance.total_requests(), 1);
}

// ============================================================================
// Test Scenario 4: Accounting
// ============================================================================

/// Scenario: cost is tokens times per-token price, exactly
#[test]
fn scenario_cost_formula() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..500 {
        let cin = rng.gen_range(0.0..0.01);
        let cout = rng.gen_range(0.0..0.01);
        let input = rng.gen_range(0..1_000_000_u64);
        let output = rng.gen_range(0..1_000_000_u64);
        let descriptor = ModelDescriptor::new("p", "m").with_costs(cin, cout);
        assert_eq!(
            descriptor.cost_for(input, output),
            input as f64 * cin + output as f64 * cout
        );
    }
}

/// Scenario: concurrent calls each produce one usage record and one metric
#[tokio::test]
async fn scenario_concurrent_calls_account_exactly_once() {
    let usage = Arc::new(InMemoryUsageSink::new());
    let performance = Arc::new(InMemoryPerformanceSink::new());
    let router = RequestRouter::builder()
        .catalog(StaticCatalog::empty().with_entry(model("a", 5, 0.002, 100)))
        .backends(BackendRegistry::new().with_adapter(Arc::new(ScriptedAdapter::new("mock"))))
        .usage_sink(usage.clone())
        .performance_sink(performance.clone())
        .build();
    router.reload_models().await;

    let ctx = RouteContext::new("u", "chat");
    let calls = (0..20).map(|i| router.call(AiRequest::new(format!("request {i}")), &ctx));
    let results = futures::future::join_all(calls).await;
    assert!(results.iter().all(std::result::Result::is_ok));

    let records = usage.records();
    assert_eq!(records.len(), 20);
    assert_eq!(performance.total_requests(), 20);
    // 1000 * 0.002 + 250 * 0.002
    assert!(records.iter().all(|r| r.cost == 1_000.0 * 0.002 + 250.0 * 0.002));
}

// ============================================================================
// Test Scenario 5: Streaming
// ============================================================================

/// Scenario: a backend that never finishes is cut off at the deadline
#[tokio::test(start_paused = true)]
async fn scenario_stream_deadline_truncates() {
    let usage = Arc::new(InMemoryUsageSink::new());
    let router = RequestRouter::builder()
        .catalog(StaticCatalog::empty().with_entry(model("a", 5, 0.001, 100)))
        .backends(
            BackendRegistry::new().with_adapter(Arc::new(ScriptedAdapter::new("mock").hanging())),
        )
        .usage_sink(usage.clone())
        .stream_deadline(Duration::from_secs(3))
        .build();
    router.reload_models().await;

    let mut stream = router
        .stream(AiRequest::new("go"), &RouteContext::new("u", "chat"))
        .await
        .unwrap();

    let mut yielded = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next_chunk().await {
        match item {
            Ok(text) => yielded.push(text),
            Err(e) => errors.push(e),
        }
    }

    assert_eq!(yielded, vec!["one ", "two ", "three"]);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), "TIMEOUT");
    assert_eq!(stream.state(), StreamState::TimedOut);
    assert_eq!(stream.next_chunk().await, None);

    let records = usage.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].output_tokens, TokenUsage::estimate_tokens("one two three"));
}

/// Scenario: a stream consumed as a `futures::Stream`
#[tokio::test]
async fn scenario_stream_as_futures_stream() {
    use futures::StreamExt;

    let router = RequestRouter::builder()
        .catalog(StaticCatalog::empty().with_entry(model("a", 5, 0.001, 100)))
        .backends(BackendRegistry::new().with_adapter(Arc::new(ScriptedAdapter::new("mock"))))
        .build();
    router.reload_models().await;

    let stream = router
        .stream(AiRequest::new("go"), &RouteContext::new("u", "chat"))
        .await
        .unwrap();
    let text: Vec<String> = stream
        .into_stream()
        .filter_map(|item| async move { item.ok() })
        .collect()
        .await;
    assert_eq!(text.concat(), "one two three");
}

// ============================================================================
// Test Scenario 6: Registry snapshot isolation
// ============================================================================

/// Store whose every load returns a new version for all models at once
struct VersionedStore {
    version: AtomicU64,
}

#[async_trait]
impl ConfigStore for VersionedStore {
    async fn get_all_model_configs(&self) -> anyhow::Result<Vec<StoredModelConfig>> {
        let v = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let quality = (v % 9 + 1) as u8;
        let cost = v as f64 * 1e-6;
        Ok(["x", "y", "z"]
            .iter()
            .map(|name| {
                StoredModelConfig::new("mock", *name)
                    .with_quality(quality)
                    .with_costs(cost, cost)
            })
            .collect())
    }
}

/// Scenario: readers racing reloads never see two versions in one snapshot
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_reload_atomicity() {
    let router = Arc::new(
        RequestRouter::builder()
            .catalog(StaticCatalog::empty())
            .backends(BackendRegistry::new().with_adapter(Arc::new(ScriptedAdapter::new("mock"))))
            .config_store(Arc::new(VersionedStore {
                version: AtomicU64::new(0),
            }))
            .build(),
    );
    router.reload_models().await;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let mut last_generation = 0;
                for _ in 0..2_000 {
                    let snapshot = router.snapshot();
                    assert!(snapshot.generation() >= last_generation);
                    last_generation = snapshot.generation();

                    let models = snapshot.models();
                    assert_eq!(models.len(), 3);
                    let first = &models[0];
                    for m in models {
                        assert_eq!(m.quality, first.quality, "mixed snapshot");
                        assert_eq!(m.cost_per_input_token, first.cost_per_input_token);
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                for _ in 0..100 {
                    router.reload_models().await;
                }
            })
        })
        .collect();

    for handle in readers.into_iter().chain(writers) {
        handle.await.unwrap();
    }
    assert_eq!(router.snapshot().generation(), 201);
}

/// Scenario: racing reloads resolve last-write-wins on the newest generation
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_racing_reloads_publish_in_generation_order() {
    const RELOADERS: u64 = 8;

    let router = Arc::new(
        RequestRouter::builder()
            .catalog(StaticCatalog::empty())
            .backends(BackendRegistry::new().with_adapter(Arc::new(ScriptedAdapter::new("mock"))))
            .config_store(Arc::new(VersionedStore {
                version: AtomicU64::new(0),
            }))
            .build(),
    );

    let mut expected_generation = 0;
    for _ in 0..25 {
        let reloads: Vec<_> = (0..RELOADERS)
            .map(|_| {
                let router = Arc::clone(&router);
                tokio::spawn(async move { router.reload_models().await })
            })
            .collect();

        let mut generations = Vec::new();
        for handle in reloads {
            generations.push(handle.await.unwrap().generation);
        }
        generations.sort_unstable();
        let round: Vec<u64> = (1..=RELOADERS).map(|i| expected_generation + i).collect();
        assert_eq!(generations, round, "every reload gets its own generation");
        expected_generation += RELOADERS;

        // Whichever reload published last is current, and it is the newest
        let snapshot = router.snapshot();
        assert_eq!(snapshot.generation(), expected_generation);
        assert_eq!(snapshot.len(), 3);
        let first = &snapshot.models()[0];
        assert!(snapshot.models().iter().all(|m| m.quality == first.quality));
    }
}
