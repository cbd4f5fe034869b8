//! Store-backed orchestration of the detectors
//!
//! The statistical components are pure; [`InsightEngine`] owns their
//! configuration, performs the batched store reads for fleet-level runs,
//! and records metrics and structured events for every result.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::anomaly::{AnomalyDetector, CompositeScorer, PatternRules};
use crate::config::EngineConfig;
use crate::correlation::CorrelationEngine;
use crate::error::{InsightError, Result, StoreError};
use crate::forecast::{FleetForecaster, ForecastCache};
use crate::models::{
    AnomalyVerdict, CapacityForecast, CompositeAnomaly, CorrelationPair, EntitySeries,
    MetricType, Sample,
};
use crate::observability::{EngineMetrics, InsightLogger};
use crate::store::MetricsStore;

/// Result of one full detection cycle over the fleet
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetScan {
    pub verdicts: Vec<AnomalyVerdict>,
    /// Highest composite score first
    pub composites: Vec<CompositeAnomaly>,
}

impl FleetScan {
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyVerdict> {
        self.verdicts.iter().filter(|v| v.is_anomalous)
    }
}

pub struct InsightEngine {
    config: EngineConfig,
    detector: AnomalyDetector,
    scorer: CompositeScorer,
    correlation: CorrelationEngine,
    fleet: FleetForecaster,
    cache: Arc<ForecastCache>,
    metrics: EngineMetrics,
    logger: InsightLogger,
}

impl InsightEngine {
    /// Build an engine from validated configuration with a fresh forecast cache
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            detector: AnomalyDetector::from_config(&config.anomaly),
            scorer: CompositeScorer::new(&config.composite),
            correlation: CorrelationEngine::from_config(&config.correlation),
            fleet: FleetForecaster::from_config(&config.forecast),
            cache: Arc::new(ForecastCache::new(config.forecast.cache_ttl())),
            metrics: EngineMetrics::new(),
            logger: InsightLogger::new("insight-engine"),
            config,
        })
    }

    /// Share a forecast cache between engines
    pub fn with_cache(mut self, cache: Arc<ForecastCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rules(mut self, rules: PatternRules) -> Self {
        self.scorer = self.scorer.with_rules(rules);
        self
    }

    pub fn with_logger(mut self, logger: InsightLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ForecastCache> {
        &self.cache
    }

    /// Evaluate one value against a window of history
    pub fn detect(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        window: &[Sample],
        current: f64,
    ) -> Option<AnomalyVerdict> {
        let verdict = self.detector.evaluate(entity_id, metric_type, window, current)?;
        self.metrics.record_verdict(&verdict);
        if verdict.is_anomalous {
            self.logger.log_anomaly(&verdict);
        }
        Some(verdict)
    }

    /// Combine one entity's verdicts into a diagnosis
    pub fn composite(
        &self,
        entity_id: &str,
        verdicts: &[AnomalyVerdict],
        timestamp: DateTime<Utc>,
    ) -> Option<CompositeAnomaly> {
        let composite = self.scorer.score(entity_id, verdicts, timestamp)?;
        self.metrics.record_composite(composite.severity);
        self.logger.log_composite(&composite);
        Some(composite)
    }

    /// Forecast a single series already in hand
    pub fn forecast(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        samples: &[Sample],
    ) -> Option<CapacityForecast> {
        self.fleet.forecaster.forecast(entity_id, metric_type, samples)
    }

    /// Correlate series already in hand for one metric type
    pub fn correlate(&self, metric_type: MetricType, series: &[EntitySeries]) -> Vec<CorrelationPair> {
        self.correlation.correlate(metric_type, series)
    }

    /// Evaluate the latest value of each metric against its preceding window
    ///
    /// Metrics without enough history yield no verdict.
    pub async fn scan_entity(
        &self,
        store: &dyn MetricsStore,
        entity_id: &str,
        metric_types: &[MetricType],
    ) -> Result<Vec<AnomalyVerdict>> {
        let window_size = self.detector.window_size;
        let mut verdicts = Vec::with_capacity(metric_types.len());

        for &metric_type in metric_types {
            let window = self.read(
                "recent_samples",
                store
                    .recent_samples(entity_id, metric_type, window_size + 1)
                    .await,
            )?;
            let latest = self.read(
                "latest_value",
                store.latest_value(entity_id, metric_type).await,
            )?;
            let Some(latest) = latest else {
                continue;
            };

            let baseline = match window.last() {
                Some(last) if last.timestamp == latest.timestamp => &window[..window.len() - 1],
                _ => &window[window.len().saturating_sub(window_size)..],
            };

            if let Some(verdict) = self.detect(entity_id, metric_type, baseline, latest.value) {
                verdicts.push(verdict);
            }
        }

        Ok(verdicts)
    }

    /// One detection cycle over every entity the store knows
    pub async fn scan_fleet(&self, store: &dyn MetricsStore) -> Result<FleetScan> {
        let started = Instant::now();
        let entity_ids = self.read("list_entities", store.list_entities().await)?;
        let tracked = self.config.anomaly.tracked_metrics.clone();
        let timestamp = Utc::now();

        let mut scan = FleetScan::default();
        for entity_id in &entity_ids {
            let verdicts = self.scan_entity(store, entity_id, &tracked).await?;
            if let Some(composite) = self.composite(entity_id, &verdicts, timestamp) {
                scan.composites.push(composite);
            }
            scan.verdicts.extend(verdicts);
        }
        crate::anomaly::sort_by_score(&mut scan.composites);

        self.metrics.observe_run("scan", started.elapsed());
        self.logger
            .log_scan(entity_ids.len(), scan.verdicts.len(), scan.composites.len());
        Ok(scan)
    }

    /// Strongly correlated entity pairs across every tracked metric type
    ///
    /// Issues one bucketed read per metric type.
    pub async fn correlations(&self, store: &dyn MetricsStore) -> Result<Vec<CorrelationPair>> {
        let started = Instant::now();
        let config = &self.config.correlation;

        let mut by_metric = Vec::with_capacity(config.tracked_metrics.len());
        for &metric_type in &config.tracked_metrics {
            let series = self.read(
                "bucketed_averages",
                store
                    .bucketed_averages(metric_type, config.lookback(), config.bucket_width())
                    .await,
            )?;
            debug!(
                metric_type = %metric_type,
                entities = series.len(),
                "Read bucketed series"
            );
            by_metric.push((metric_type, series.into_values().collect::<Vec<_>>()));
        }

        let pairs = self.correlation.correlate_all(&by_metric);

        let elapsed = started.elapsed();
        self.metrics.add_correlated_pairs(pairs.len());
        self.metrics.observe_run("correlate", elapsed);
        self.logger.log_correlation_run(by_metric.len(), pairs.len(), elapsed);
        Ok(pairs)
    }

    /// Forecast every tracked metric of one entity over its full history
    pub async fn entity_forecasts(
        &self,
        store: &dyn MetricsStore,
        entity_id: &str,
    ) -> Result<Vec<CapacityForecast>> {
        let display_name = self.read("display_name", store.display_name(entity_id).await)?;

        let mut forecasts = Vec::with_capacity(self.fleet.tracked_metrics.len());
        for &metric_type in &self.fleet.tracked_metrics {
            let samples = self.read(
                "recent_samples",
                store.recent_samples(entity_id, metric_type, usize::MAX).await,
            )?;
            if let Some(mut forecast) = self.forecast(entity_id, metric_type, &samples) {
                forecast.display_name = display_name.clone();
                forecasts.push(forecast);
            }
        }

        self.metrics.add_forecasts(forecasts.len());
        Ok(forecasts)
    }

    /// The `limit` most urgent capacity forecasts across the fleet
    ///
    /// Served from the cache while a fresh entry covers `limit`; otherwise
    /// one batched store read is made and the result cached once complete.
    pub async fn fleet_forecast(
        &self,
        store: &dyn MetricsStore,
        limit: usize,
    ) -> Result<Vec<CapacityForecast>> {
        let started = Instant::now();

        if let Some(cached) = self.cache.get(limit) {
            self.metrics.record_cache_lookup(true);
            self.logger.log_forecast_run(&cached, true, started.elapsed());
            return Ok(cached);
        }
        self.metrics.record_cache_lookup(false);

        let fleet = self.read(
            "fleet_samples",
            store
                .fleet_samples(&self.fleet.tracked_metrics, self.config.forecast.fleet_lookback())
                .await,
        )?;
        let results = self.fleet.forecast_fleet(&fleet, limit);
        self.cache.store(limit, results.clone());

        let elapsed = started.elapsed();
        self.metrics.add_forecasts(results.len());
        self.metrics.observe_run("forecast", elapsed);
        self.logger.log_forecast_run(&results, false, elapsed);
        Ok(results)
    }

    fn read<T>(&self, operation: &str, result: std::result::Result<T, StoreError>) -> Result<T> {
        result.map_err(|error| {
            self.metrics.inc_store_errors(operation);
            self.logger.log_store_error(operation, &error);
            InsightError::from(error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CorrelationDirection, CorrelationStrength, EntityMetrics, Pattern, Severity, Trend,
    };
    use crate::store::InMemoryMetricsStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn spaced(values: &[f64], step: ChronoDuration) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(start() + step * i as i32, *v))
            .collect()
    }

    fn engine() -> InsightEngine {
        InsightEngine::new(EngineConfig::default()).unwrap()
    }

    /// Counts batched fleet reads before delegating
    struct CountingStore {
        inner: InMemoryMetricsStore,
        fleet_reads: AtomicUsize,
    }

    #[async_trait]
    impl MetricsStore for CountingStore {
        async fn recent_samples(
            &self,
            entity_id: &str,
            metric_type: MetricType,
            window: usize,
        ) -> std::result::Result<Vec<Sample>, StoreError> {
            self.inner.recent_samples(entity_id, metric_type, window).await
        }

        async fn bucketed_averages(
            &self,
            metric_type: MetricType,
            lookback: Duration,
            bucket_width: Duration,
        ) -> std::result::Result<HashMap<String, EntitySeries>, StoreError> {
            self.inner
                .bucketed_averages(metric_type, lookback, bucket_width)
                .await
        }

        async fn latest_value(
            &self,
            entity_id: &str,
            metric_type: MetricType,
        ) -> std::result::Result<Option<Sample>, StoreError> {
            self.inner.latest_value(entity_id, metric_type).await
        }

        async fn fleet_samples(
            &self,
            metric_types: &[MetricType],
            lookback: Duration,
        ) -> std::result::Result<HashMap<String, EntityMetrics>, StoreError> {
            self.fleet_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.fleet_samples(metric_types, lookback).await
        }

        async fn list_entities(&self) -> std::result::Result<Vec<String>, StoreError> {
            self.inner.list_entities().await
        }

        async fn display_name(
            &self,
            entity_id: &str,
        ) -> std::result::Result<Option<String>, StoreError> {
            self.inner.display_name(entity_id).await
        }
    }

    /// Fails every read, or never completes when `hang` is set
    struct BrokenStore {
        hang: bool,
    }

    impl BrokenStore {
        async fn fail(&self) -> StoreError {
            if self.hang {
                std::future::pending::<()>().await;
            }
            StoreError::Unavailable("connection refused".to_string())
        }
    }

    #[async_trait]
    impl MetricsStore for BrokenStore {
        async fn recent_samples(
            &self,
            _entity_id: &str,
            _metric_type: MetricType,
            _window: usize,
        ) -> std::result::Result<Vec<Sample>, StoreError> {
            Err(self.fail().await)
        }

        async fn bucketed_averages(
            &self,
            _metric_type: MetricType,
            _lookback: Duration,
            _bucket_width: Duration,
        ) -> std::result::Result<HashMap<String, EntitySeries>, StoreError> {
            Err(self.fail().await)
        }

        async fn latest_value(
            &self,
            _entity_id: &str,
            _metric_type: MetricType,
        ) -> std::result::Result<Option<Sample>, StoreError> {
            Err(self.fail().await)
        }

        async fn fleet_samples(
            &self,
            _metric_types: &[MetricType],
            _lookback: Duration,
        ) -> std::result::Result<HashMap<String, EntityMetrics>, StoreError> {
            Err(self.fail().await)
        }

        async fn list_entities(&self) -> std::result::Result<Vec<String>, StoreError> {
            Err(self.fail().await)
        }
    }

    fn growth_store() -> CountingStore {
        let inner = InMemoryMetricsStore::new().with_now(start() + ChronoDuration::hours(23));
        let values: Vec<f64> = (0..24).map(|i| 50.0 + i as f64).collect();
        inner.insert_samples("db-1", MetricType::Memory, spaced(&values, ChronoDuration::hours(1)));
        CountingStore {
            inner,
            fleet_reads: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_scan_entity_excludes_current_from_baseline() {
        let store = InMemoryMetricsStore::new();
        store.insert_samples(
            "web-1",
            MetricType::Cpu,
            spaced(&[40.0, 42.0, 38.0, 41.0, 39.0, 46.0], ChronoDuration::minutes(1)),
        );

        let verdicts = engine()
            .scan_entity(&store, "web-1", &[MetricType::Cpu, MetricType::Memory])
            .await
            .unwrap();

        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].mean, 40.0);
        assert_eq!(verdicts[0].z_score, 4.24);
        assert!(verdicts[0].is_anomalous);
    }

    #[tokio::test]
    async fn test_scan_fleet_diagnoses_exhaustion() {
        let store = InMemoryMetricsStore::new();
        let step = ChronoDuration::minutes(1);
        store.insert_samples("web-1", MetricType::Cpu, spaced(&[40.0, 42.0, 38.0, 41.0, 39.0, 46.0], step));
        store.insert_samples("web-1", MetricType::Memory, spaced(&[60.0, 62.0, 58.0, 61.0, 59.0, 66.0], step));
        store.insert_samples("web-2", MetricType::Cpu, spaced(&[20.0; 8], step));

        let scan = engine().scan_fleet(&store).await.unwrap();

        assert_eq!(scan.verdicts.len(), 3);
        assert_eq!(scan.anomalies().count(), 2);
        assert_eq!(scan.composites.len(), 1);

        let composite = &scan.composites[0];
        assert_eq!(composite.entity_id, "web-1");
        assert_eq!(composite.pattern, Some(Pattern::ResourceExhaustion));
        assert_eq!(composite.composite_score, 4.24);
        assert_eq!(composite.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_correlations_from_store() {
        let store = InMemoryMetricsStore::new().with_now(start() + ChronoDuration::hours(2));
        let a: Vec<f64> = (0..12).map(|i| 10.0 + ((i * 7) % 13) as f64).collect();
        let b: Vec<f64> = a.iter().map(|v| 100.0 - v).collect();
        store.insert_samples("a", MetricType::Cpu, spaced(&a, ChronoDuration::minutes(5)));
        store.insert_samples("b", MetricType::Cpu, spaced(&b, ChronoDuration::minutes(5)));
        store.set_display_name("a", "frontend");

        let pairs = engine().correlations(&store).await.unwrap();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].correlation, -1.0);
        assert_eq!(pairs[0].direction, CorrelationDirection::Negative);
        assert_eq!(pairs[0].strength, CorrelationStrength::VeryStrong);
        assert_eq!(pairs[0].sample_count, 12);
    }

    #[tokio::test]
    async fn test_fleet_forecast_uses_cache() {
        let store = growth_store();
        let engine = engine();

        let first = engine.fleet_forecast(&store, 5).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].trend, Trend::Increasing);
        assert_eq!(first[0].time_to_threshold_hours, Some(17.0));

        let second = engine.fleet_forecast(&store, 3).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.fleet_reads.load(Ordering::SeqCst), 1);

        // A larger request than the cached one recomputes
        engine.fleet_forecast(&store, 10).await.unwrap();
        assert_eq!(store.fleet_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entity_forecasts_carry_display_name() {
        let store = growth_store();
        store.inner.set_display_name("db-1", "postgres");
        let engine = engine();

        let forecasts = engine.entity_forecasts(&store, "db-1").await.unwrap();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].metric_type, MetricType::Memory);
        assert_eq!(forecasts[0].display_name.as_deref(), Some("postgres"));
        assert_eq!(forecasts[0].time_to_threshold_hours, Some(17.0));

        assert!(engine.entity_forecasts(&store, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_forecast_windows_are_valid() {
        let mut config = EngineConfig::default();
        config.forecast.lookback_hours = 1.0e12;
        config.forecast.horizon_hours = 1.0e12;
        let engine = InsightEngine::new(config).unwrap();
        let store = growth_store();

        let forecasts = engine.entity_forecasts(&store, "db-1").await.unwrap();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].slope, 1.0);
    }

    #[tokio::test]
    async fn test_shared_cache_between_engines() {
        let store = growth_store();
        let cache = Arc::new(ForecastCache::default());
        let a = engine().with_cache(Arc::clone(&cache));
        let b = engine().with_cache(Arc::clone(&cache));

        a.fleet_forecast(&store, 5).await.unwrap();
        b.fleet_forecast(&store, 5).await.unwrap();
        assert_eq!(store.fleet_reads.load(Ordering::SeqCst), 1);

        cache.invalidate();
        b.fleet_forecast(&store, 5).await.unwrap();
        assert_eq!(store.fleet_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let engine = engine();
        let store = BrokenStore { hang: false };

        let result = engine.fleet_forecast(&store, 5).await;
        assert!(matches!(result, Err(InsightError::Store(StoreError::Unavailable(_)))));
        assert!(engine.cache().is_empty());

        assert!(engine.correlations(&store).await.is_err());
        assert!(engine.scan_fleet(&store).await.is_err());
        assert!(engine
            .scan_entity(&store, "web-1", &[MetricType::Cpu])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancelled_forecast_leaves_cache_empty() {
        let engine = engine();
        let store = BrokenStore { hang: true };

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), engine.fleet_forecast(&store, 5)).await;

        assert!(outcome.is_err());
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.anomaly.threshold = f64::NAN;
        assert!(matches!(
            InsightEngine::new(config),
            Err(InsightError::InvalidConfig(_))
        ));
    }
}
