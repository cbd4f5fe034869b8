//! Read-only access to metric history
//!
//! The engine is storage-agnostic: every read goes through [`MetricsStore`].
//! [`InMemoryMetricsStore`] is a reference implementation over a concurrent
//! map, loadable from a JSON snapshot.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{EntityMetrics, EntitySeries, MetricType, Sample, Series};

/// Source of metric samples for the engine
///
/// Fleet-level reads are batched: one call covers every entity.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Most recent `window` samples for one entity, ascending by time
    async fn recent_samples(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        window: usize,
    ) -> Result<Series, StoreError>;

    /// Per-entity averages over fixed-width buckets within the lookback
    async fn bucketed_averages(
        &self,
        metric_type: MetricType,
        lookback: Duration,
        bucket_width: Duration,
    ) -> Result<HashMap<String, EntitySeries>, StoreError>;

    /// Newest sample for one entity, if any
    async fn latest_value(
        &self,
        entity_id: &str,
        metric_type: MetricType,
    ) -> Result<Option<Sample>, StoreError>;

    /// Raw samples of several metric types for every entity within the lookback
    async fn fleet_samples(
        &self,
        metric_types: &[MetricType],
        lookback: Duration,
    ) -> Result<HashMap<String, EntityMetrics>, StoreError>;

    /// All known entity ids
    async fn list_entities(&self) -> Result<Vec<String>, StoreError>;

    /// Human-readable name for an entity; stores without names report none
    async fn display_name(&self, _entity_id: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

/// On-disk snapshot format for [`InMemoryMetricsStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Reference "now" for lookback windows; wall clock when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
    pub entities: Vec<SnapshotEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntity {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub series: HashMap<MetricType, Series>,
}

/// Metrics store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    entities: DashMap<String, EntityMetrics>,
    /// Fixed clock; `None` uses the wall clock
    now: Option<DateTime<Utc>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin "now" so lookback windows are reproducible
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self {
            entities: DashMap::new(),
            now: snapshot.as_of,
        };
        for entity in snapshot.entities {
            if let Some(name) = entity.display_name {
                store.set_display_name(&entity.entity_id, name);
            }
            for (metric_type, samples) in entity.series {
                store.insert_samples(&entity.entity_id, metric_type, samples);
            }
        }
        store
    }

    /// Load a JSON snapshot file
    pub async fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        debug!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            "Loaded metrics snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn set_display_name(&self, entity_id: &str, name: impl Into<String>) {
        self.entities
            .entry(entity_id.to_string())
            .or_default()
            .display_name = Some(name.into());
    }

    /// Append samples, keeping the series ordered by timestamp
    pub fn insert_samples(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        samples: impl IntoIterator<Item = Sample>,
    ) {
        let mut entity = self.entities.entry(entity_id.to_string()).or_default();
        let series = entity.series.entry(metric_type).or_default();
        series.extend(samples);
        series.sort_by_key(|s| s.timestamp);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn cutoff(&self, lookback: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|lookback| self.now().checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Average samples into fixed-width buckets keyed by bucket start
pub fn bucketize(samples: &[Sample], bucket_width: Duration) -> Series {
    let width = bucket_width.as_millis().max(1) as i64;
    let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();

    for sample in samples.iter().filter(|s| s.value.is_finite()) {
        let key = sample.timestamp.timestamp_millis().div_euclid(width) * width;
        let bucket = buckets.entry(key).or_insert((0.0, 0));
        bucket.0 += sample.value;
        bucket.1 += 1;
    }

    buckets
        .into_iter()
        .filter_map(|(key, (sum, count))| {
            DateTime::<Utc>::from_timestamp_millis(key)
                .map(|timestamp| Sample::new(timestamp, sum / count as f64))
        })
        .collect()
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn recent_samples(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        window: usize,
    ) -> Result<Series, StoreError> {
        let Some(entity) = self.entities.get(entity_id) else {
            return Ok(Vec::new());
        };
        let Some(series) = entity.series.get(&metric_type) else {
            return Ok(Vec::new());
        };
        let start = series.len().saturating_sub(window);
        Ok(series[start..].to_vec())
    }

    async fn bucketed_averages(
        &self,
        metric_type: MetricType,
        lookback: Duration,
        bucket_width: Duration,
    ) -> Result<HashMap<String, EntitySeries>, StoreError> {
        let cutoff = self.cutoff(lookback);
        let mut result = HashMap::new();

        for entry in self.entities.iter() {
            let Some(series) = entry.series.get(&metric_type) else {
                continue;
            };
            let recent: Vec<Sample> = series
                .iter()
                .filter(|s| s.timestamp >= cutoff)
                .copied()
                .collect();
            if recent.is_empty() {
                continue;
            }
            result.insert(
                entry.key().clone(),
                EntitySeries {
                    entity_id: entry.key().clone(),
                    display_name: entry.display_name.clone(),
                    samples: bucketize(&recent, bucket_width),
                },
            );
        }

        Ok(result)
    }

    async fn latest_value(
        &self,
        entity_id: &str,
        metric_type: MetricType,
    ) -> Result<Option<Sample>, StoreError> {
        Ok(self
            .entities
            .get(entity_id)
            .and_then(|e| e.series.get(&metric_type).and_then(|s| s.last().copied())))
    }

    async fn fleet_samples(
        &self,
        metric_types: &[MetricType],
        lookback: Duration,
    ) -> Result<HashMap<String, EntityMetrics>, StoreError> {
        let cutoff = self.cutoff(lookback);
        let mut result = HashMap::new();

        for entry in self.entities.iter() {
            let series: HashMap<MetricType, Series> = metric_types
                .iter()
                .filter_map(|m| {
                    let recent: Series = entry
                        .series
                        .get(m)?
                        .iter()
                        .filter(|s| s.timestamp >= cutoff)
                        .copied()
                        .collect();
                    (!recent.is_empty()).then_some((*m, recent))
                })
                .collect();
            if series.is_empty() {
                continue;
            }
            result.insert(
                entry.key().clone(),
                EntityMetrics {
                    display_name: entry.display_name.clone(),
                    series,
                },
            );
        }

        Ok(result)
    }

    async fn list_entities(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn display_name(&self, entity_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entities
            .get(entity_id)
            .and_then(|e| e.display_name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn minutely(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(start() + chrono::Duration::minutes(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_bucketize_averages_per_bucket() {
        let samples = minutely(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let buckets = bucketize(&samples, Duration::from_secs(5 * 60));

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].timestamp, start());
        assert_eq!(buckets[0].value, 3.0);
        assert_eq!(buckets[1].value, 6.5);
    }

    #[tokio::test]
    async fn test_recent_samples_window() {
        let store = InMemoryMetricsStore::new();
        store.insert_samples("web-1", MetricType::Cpu, minutely(&[1.0, 2.0, 3.0, 4.0]));

        let recent = store.recent_samples("web-1", MetricType::Cpu, 2).await.unwrap();
        assert_eq!(recent.iter().map(|s| s.value).collect::<Vec<_>>(), vec![3.0, 4.0]);

        let missing = store.recent_samples("nope", MetricType::Cpu, 2).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_insert_keeps_order_and_latest() {
        let store = InMemoryMetricsStore::new();
        let mut samples = minutely(&[1.0, 2.0, 3.0]);
        samples.reverse();
        store.insert_samples("web-1", MetricType::Memory, samples);

        let latest = store.latest_value("web-1", MetricType::Memory).await.unwrap();
        assert_eq!(latest.unwrap().value, 3.0);
        assert!(store.latest_value("web-1", MetricType::Cpu).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookback_uses_pinned_clock() {
        let now = start() + chrono::Duration::minutes(9);
        let store = InMemoryMetricsStore::new().with_now(now);
        store.set_display_name("web-1", "Web 1");
        store.insert_samples("web-1", MetricType::Cpu, minutely(&[0.0; 10]));

        let fleet = store
            .fleet_samples(&[MetricType::Cpu, MetricType::Memory], Duration::from_secs(4 * 60))
            .await
            .unwrap();
        let entity = &fleet["web-1"];
        assert_eq!(entity.display_name.as_deref(), Some("Web 1"));
        assert_eq!(entity.series[&MetricType::Cpu].len(), 5);
        assert!(!entity.series.contains_key(&MetricType::Memory));

        let buckets = store
            .bucketed_averages(MetricType::Cpu, Duration::from_secs(3600), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(buckets["web-1"].samples.len(), 2);
        assert_eq!(buckets["web-1"].display_name.as_deref(), Some("Web 1"));

        assert_eq!(store.display_name("web-1").await.unwrap().as_deref(), Some("Web 1"));
        assert!(store.display_name("web-2").await.unwrap().is_none());
    }

    #[test]
    fn test_load_snapshot_file() {
        let snapshot = serde_json::json!({
            "asOf": "2024-02-01T01:00:00Z",
            "entities": [
                {
                    "entityId": "db-1",
                    "displayName": "Primary DB",
                    "series": {
                        "cpu": [
                            {"timestamp": "2024-02-01T00:00:00Z", "value": 10.0},
                            {"timestamp": "2024-02-01T00:01:00Z", "value": 12.5}
                        ]
                    }
                },
                {"entityId": "cache-1"}
            ]
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", snapshot).unwrap();

        let store = tokio_test::block_on(InMemoryMetricsStore::load_snapshot(file.path())).unwrap();
        assert_eq!(store.len(), 1);
        let ids = tokio_test::block_on(store.list_entities()).unwrap();
        assert_eq!(ids, vec!["db-1".to_string()]);
    }

    #[test]
    fn test_load_snapshot_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let result = tokio_test::block_on(InMemoryMetricsStore::load_snapshot(file.path()));
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }
}
