//! Observability for the insight engine
//!
//! Provides:
//! - Prometheus metrics (verdict and diagnosis counters, fleet run latency, cache hits)
//! - Structured logging of domain events with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{AnomalyVerdict, CapacityForecast, CompositeAnomaly, Severity, Trend};

/// Histogram buckets for fleet run latency (in seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    verdicts: IntCounter,
    anomalies: IntCounterVec,
    composites: IntCounterVec,
    correlated_pairs: IntCounter,
    forecasts: IntCounter,
    cache_lookups: IntCounterVec,
    store_errors: IntCounterVec,
    run_latency_seconds: HistogramVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            verdicts: register_int_counter!(
                "insight_verdicts_total",
                "Anomaly verdicts produced"
            )
            .expect("Failed to register verdicts"),

            anomalies: register_int_counter_vec!(
                "insight_anomalies_total",
                "Verdicts flagged as anomalous",
                &["metric_type"]
            )
            .expect("Failed to register anomalies"),

            composites: register_int_counter_vec!(
                "insight_composite_anomalies_total",
                "Composite diagnoses emitted",
                &["severity"]
            )
            .expect("Failed to register composites"),

            correlated_pairs: register_int_counter!(
                "insight_correlated_pairs_total",
                "Strongly correlated entity pairs found"
            )
            .expect("Failed to register correlated_pairs"),

            forecasts: register_int_counter!(
                "insight_forecasts_total",
                "Capacity forecasts produced by fleet runs"
            )
            .expect("Failed to register forecasts"),

            cache_lookups: register_int_counter_vec!(
                "insight_forecast_cache_lookups_total",
                "Fleet forecast cache lookups",
                &["result"]
            )
            .expect("Failed to register cache_lookups"),

            store_errors: register_int_counter_vec!(
                "insight_store_errors_total",
                "Failed metrics store reads",
                &["operation"]
            )
            .expect("Failed to register store_errors"),

            run_latency_seconds: register_histogram_vec!(
                "insight_run_latency_seconds",
                "Wall time of fleet-level runs including store reads",
                &["run"],
                RUN_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register run_latency_seconds"),
        }
    }
}

/// Handle to the process-wide engine metrics
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn record_verdict(&self, verdict: &AnomalyVerdict) {
        let inner = self.inner();
        inner.verdicts.inc();
        if verdict.is_anomalous {
            inner
                .anomalies
                .with_label_values(&[verdict.metric_type.as_str()])
                .inc();
        }
    }

    pub fn record_composite(&self, severity: Severity) {
        self.inner()
            .composites
            .with_label_values(&[&severity.to_string()])
            .inc();
    }

    pub fn add_correlated_pairs(&self, count: usize) {
        self.inner().correlated_pairs.inc_by(count as u64);
    }

    pub fn add_forecasts(&self, count: usize) {
        self.inner().forecasts.inc_by(count as u64);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.inner().cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn inc_store_errors(&self, operation: &str) {
        self.inner().store_errors.with_label_values(&[operation]).inc();
    }

    /// Record the duration of a fleet run (`scan`, `correlate`, `forecast`)
    pub fn observe_run(&self, run: &str, elapsed: Duration) {
        self.inner()
            .run_latency_seconds
            .with_label_values(&[run])
            .observe(elapsed.as_secs_f64());
    }

    /// Counter value for cache lookups with the given result label
    pub fn cache_lookups(&self, hit: bool) -> u64 {
        let result = if hit { "hit" } else { "miss" };
        self.inner().cache_lookups.with_label_values(&[result]).get()
    }
}

/// Structured logger for insight events
#[derive(Debug, Clone)]
pub struct InsightLogger {
    source: String,
}

impl InsightLogger {
    /// `source` names the process or cycle emitting events
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn log_anomaly(&self, verdict: &AnomalyVerdict) {
        info!(
            event = "anomaly_detected",
            source = %self.source,
            entity_id = %verdict.entity_id,
            metric_type = %verdict.metric_type,
            current_value = verdict.current_value,
            mean = verdict.mean,
            z_score = verdict.z_score,
            "Metric deviates from its recent baseline"
        );
    }

    pub fn log_composite(&self, composite: &CompositeAnomaly) {
        let pattern = composite.pattern.map(|p| p.to_string());
        match composite.severity {
            Severity::High | Severity::Critical => {
                warn!(
                    event = "composite_anomaly",
                    source = %self.source,
                    entity_id = %composite.entity_id,
                    composite_score = composite.composite_score,
                    severity = %composite.severity,
                    pattern = ?pattern,
                    metrics = composite.metrics.len(),
                    "{}",
                    composite.summary()
                );
            }
            _ => {
                info!(
                    event = "composite_anomaly",
                    source = %self.source,
                    entity_id = %composite.entity_id,
                    composite_score = composite.composite_score,
                    severity = %composite.severity,
                    pattern = ?pattern,
                    metrics = composite.metrics.len(),
                    "{}",
                    composite.summary()
                );
            }
        }
    }

    pub fn log_correlation_run(&self, metric_types: usize, pairs: usize, elapsed: Duration) {
        info!(
            event = "correlation_run",
            source = %self.source,
            metric_types = metric_types,
            pairs = pairs,
            elapsed_ms = elapsed.as_millis() as u64,
            "Correlation run complete"
        );
    }

    pub fn log_forecast_run(&self, results: &[CapacityForecast], cached: bool, elapsed: Duration) {
        let rising = results
            .iter()
            .filter(|f| f.trend == Trend::Increasing)
            .count();
        let crossing = results
            .iter()
            .filter(|f| f.time_to_threshold_hours.is_some())
            .count();
        info!(
            event = "forecast_run",
            source = %self.source,
            forecasts = results.len(),
            rising = rising,
            crossing_threshold = crossing,
            cached = cached,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fleet forecast complete"
        );
    }

    pub fn log_scan(&self, entities: usize, verdicts: usize, composites: usize) {
        debug!(
            event = "scan_complete",
            source = %self.source,
            entities = entities,
            verdicts = verdicts,
            composites = composites,
            "Fleet scan complete"
        );
    }

    pub fn log_store_error(&self, operation: &str, error: &dyn std::error::Error) {
        warn!(
            event = "store_error",
            source = %self.source,
            operation = %operation,
            error = %error,
            "Metrics store read failed"
        );
    }
}
