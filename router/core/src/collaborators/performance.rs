//! Performance Sink contract
//!
//! Per-model latency and outcome tracking, plus threshold alerts:
//! - Request, success and failure counts
//! - Latency distribution (bucketed histogram, p50/p90/p99)
//! - Error-rate and latency alerts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Histogram for Latency Tracking
// ============================================================================

/// A histogram for tracking latency distributions
#[derive(Debug)]
pub struct Histogram {
    /// Upper bucket bounds in milliseconds; values above the last bound land in it
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    total_count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Histogram with the given bucket bounds (must be non-empty, ascending)
    #[must_use]
    pub fn new(buckets: Vec<f64>) -> Self {
        let buckets = if buckets.is_empty() { vec![f64::MAX] } else { buckets };
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            total_count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Default latency buckets (milliseconds)
    #[must_use]
    pub fn latency_default() -> Self {
        Self::new(vec![
            10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            60000.0, 120_000.0,
        ])
    }

    /// Record one observation
    pub fn record(&self, value_ms: u64) {
        let value = value_ms as f64;
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.buckets.len() - 1);

        self.counts[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value_ms, Ordering::Relaxed);
        self.min.fetch_min(value_ms, Ordering::Relaxed);
        self.max.fetch_max(value_ms, Ordering::Relaxed);
    }

    /// Point-in-time copy
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let counts: Vec<u64> = self
            .counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();
        let total = self.total_count.load(Ordering::Relaxed);
        let sum = self.sum.load(Ordering::Relaxed);
        let min = self.min.load(Ordering::Relaxed);

        HistogramSnapshot {
            buckets: self.buckets.clone(),
            counts,
            total,
            sum,
            min: if min == u64::MAX { 0 } else { min },
            max: self.max.load(Ordering::Relaxed),
            mean: if total > 0 { sum as f64 / total as f64 } else { 0.0 },
        }
    }
}

/// Snapshot of histogram data
#[derive(Clone, Debug)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds
    pub buckets: Vec<f64>,
    /// Observations per bucket
    pub counts: Vec<u64>,
    /// Observations
    pub total: u64,
    /// Sum of observations
    pub sum: u64,
    /// Smallest observation
    pub min: u64,
    /// Largest observation
    pub max: u64,
    /// Mean observation
    pub mean: f64,
}

impl HistogramSnapshot {
    /// Upper bound of the bucket holding the `p` quantile
    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        let target = ((self.total as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return self.buckets[i];
            }
        }
        self.buckets.last().copied().unwrap_or(0.0)
    }
}

// ============================================================================
// Counter
// ============================================================================

/// A simple atomic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Increment by one
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Per-Model Metrics
// ============================================================================

/// Live metrics for one `provider:model`
#[derive(Debug)]
pub struct ModelPerformance {
    /// Model name
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Calls recorded
    pub requests: Counter,
    /// Successful calls
    pub successes: Counter,
    /// Failed calls
    pub failures: Counter,
    /// Latency distribution
    pub latency: Histogram,
}

impl ModelPerformance {
    fn new(model: &str, provider: &str) -> Self {
        Self {
            model: model.to_string(),
            provider: provider.to_string(),
            requests: Counter::default(),
            successes: Counter::default(),
            failures: Counter::default(),
            latency: Histogram::latency_default(),
        }
    }

    /// Failed / total; 0 with no traffic
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let total = self.requests.get();
        if total == 0 {
            return 0.0;
        }
        self.failures.get() as f64 / total as f64
    }

    /// Point-in-time summary
    #[must_use]
    pub fn summary(&self) -> PerformanceSummary {
        let latency = self.latency.snapshot();
        PerformanceSummary {
            model: self.model.clone(),
            provider: self.provider.clone(),
            total_requests: self.requests.get(),
            successful_requests: self.successes.get(),
            failed_requests: self.failures.get(),
            error_rate: self.error_rate(),
            mean_latency_ms: latency.mean,
            p50_latency_ms: latency.percentile(0.5),
            p90_latency_ms: latency.percentile(0.9),
            p99_latency_ms: latency.percentile(0.99),
            max_latency_ms: latency.max,
        }
    }
}

/// Summary of one model's metrics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub model: String,
    pub provider: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub mean_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p90_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: u64,
}

// ============================================================================
// Alerts
// ============================================================================

/// What tripped an alert
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// Error rate above threshold
    HighErrorRate {
        /// Observed rate
        rate: f64,
        /// Configured threshold
        threshold: f64,
    },
    /// p90 latency above threshold
    HighLatency {
        /// Observed p90 bucket bound
        p90_ms: f64,
        /// Configured threshold
        threshold_ms: u64,
    },
}

/// One alert for one model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    /// `provider:model`
    pub model_id: String,
    /// What tripped
    #[serde(flatten)]
    pub kind: AlertKind,
}

/// Alerting thresholds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Error rate above which a model alerts
    pub max_error_rate: f64,
    /// p90 latency above which a model alerts
    pub max_p90_latency_ms: u64,
    /// Calls required before a model is judged
    pub min_requests: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.2,
            max_p90_latency_ms: 30_000,
            min_requests: 10,
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Destination for per-call performance metrics
#[async_trait]
pub trait PerformanceSink: Send + Sync {
    /// Record one call outcome
    async fn record_metrics(&self, model: &str, provider: &str, latency_ms: u64, success: bool);

    /// Summaries for every model seen
    async fn get_all_metrics(&self) -> Vec<PerformanceSummary>;

    /// Models currently breaching thresholds
    async fn check_alerts(&self) -> Vec<PerformanceAlert>;
}

/// Metrics kept in memory
#[derive(Debug, Default)]
pub struct InMemoryPerformanceSink {
    models: DashMap<String, Arc<ModelPerformance>>,
    thresholds: AlertThresholds,
}

impl InMemoryPerformanceSink {
    /// Sink with default thresholds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink with custom thresholds
    #[must_use]
    pub fn with_thresholds(thresholds: AlertThresholds) -> Self {
        Self {
            models: DashMap::new(),
            thresholds,
        }
    }

    /// Metrics for one `provider:model`
    #[must_use]
    pub fn model(&self, model_id: &str) -> Option<Arc<ModelPerformance>> {
        self.models.get(model_id).map(|m| Arc::clone(m.value()))
    }

    /// Calls recorded across all models
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.models.iter().map(|m| m.requests.get()).sum()
    }
}

#[async_trait]
impl PerformanceSink for InMemoryPerformanceSink {
    async fn record_metrics(&self, model: &str, provider: &str, latency_ms: u64, success: bool) {
        let metrics = Arc::clone(
            self.models
                .entry(format!("{provider}:{model}"))
                .or_insert_with(|| Arc::new(ModelPerformance::new(model, provider)))
                .value(),
        );

        metrics.requests.inc();
        if success {
            metrics.successes.inc();
        } else {
            metrics.failures.inc();
        }
        metrics.latency.record(latency_ms);
    }

    async fn get_all_metrics(&self) -> Vec<PerformanceSummary> {
        let mut all: Vec<_> = self.models.iter().map(|m| m.summary()).collect();
        all.sort_by(|a, b| (&a.provider, &a.model).cmp(&(&b.provider, &b.model)));
        all
    }

    async fn check_alerts(&self) -> Vec<PerformanceAlert> {
        let mut alerts = Vec::new();
        for summary in self.get_all_metrics().await {
            if summary.total_requests < self.thresholds.min_requests {
                continue;
            }
            let model_id = format!("{}:{}", summary.provider, summary.model);
            if summary.error_rate > self.thresholds.max_error_rate {
                alerts.push(PerformanceAlert {
                    model_id: model_id.clone(),
                    kind: AlertKind::HighErrorRate {
                        rate: summary.error_rate,
                        threshold: self.thresholds.max_error_rate,
                    },
                });
            }
            if summary.p90_latency_ms > self.thresholds.max_p90_latency_ms as f64 {
                alerts.push(PerformanceAlert {
                    model_id,
                    kind: AlertKind::HighLatency {
                        p90_ms: summary.p90_latency_ms,
                        threshold_ms: self.thresholds.max_p90_latency_ms,
                    },
                });
            }
        }
        alerts
    }
}
