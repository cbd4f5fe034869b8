//! Short-lived cache for fleet-wide forecast results
//!
//! Entries are immutable and swapped whole, so concurrent readers either see
//! a complete previous entry or a complete new one.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::models::CapacityForecast;

/// Default time-to-live for cached fleet forecasts (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct CacheEntry {
    computed_at: Instant,
    /// Result count the entry was computed for
    limit: usize,
    results: Vec<CapacityForecast>,
}

/// Injectable TTL cache for the fleet forecaster
#[derive(Debug)]
pub struct ForecastCache {
    ttl: Duration,
    entry: RwLock<Option<Arc<CacheEntry>>>,
}

impl ForecastCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached results for a request of `limit` forecasts
    ///
    /// Hits only while the entry is fresh and was computed for at least
    /// `limit` results; the returned copy is truncated to `limit`.
    pub fn get(&self, limit: usize) -> Option<Vec<CapacityForecast>> {
        let entry = self
            .entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;

        if entry.computed_at.elapsed() >= self.ttl || entry.limit < limit {
            return None;
        }

        Some(entry.results.iter().take(limit).cloned().collect())
    }

    /// Replace the cached entry
    pub fn store(&self, limit: usize, results: Vec<CapacityForecast>) {
        let entry = Arc::new(CacheEntry {
            computed_at: Instant::now(),
            limit,
            results,
        });
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    pub fn invalidate(&self) {
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for ForecastCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, MetricType, Trend};

    fn forecast(entity: &str) -> CapacityForecast {
        CapacityForecast {
            entity_id: entity.to_string(),
            display_name: None,
            metric_type: MetricType::Cpu,
            current_value: 50.0,
            trend: Trend::Increasing,
            slope: 1.0,
            r_squared: 0.9,
            forecast_points: Vec::new(),
            time_to_threshold_hours: Some(40.0),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn test_cold_cache_misses() {
        let cache = ForecastCache::default();
        assert!(cache.is_empty());
        assert!(cache.get(10).is_none());
    }

    #[test]
    fn test_hit_truncates_to_request() {
        let cache = ForecastCache::default();
        cache.store(10, vec![forecast("a"), forecast("b"), forecast("c")]);

        let hit = cache.get(2).unwrap();
        assert_eq!(hit.len(), 2);
        assert_eq!(hit[0].entity_id, "a");
        assert_eq!(cache.get(10).unwrap().len(), 3);
    }

    #[test]
    fn test_larger_request_misses() {
        let cache = ForecastCache::default();
        cache.store(5, vec![forecast("a")]);
        assert!(cache.get(5).is_some());
        assert!(cache.get(6).is_none());
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = ForecastCache::new(Duration::ZERO);
        cache.store(10, vec![forecast("a")]);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = ForecastCache::default();
        cache.store(10, vec![forecast("a")]);
        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_entries() {
        let cache = Arc::new(ForecastCache::default());
        cache.store(2, vec![forecast("a"), forecast("b")]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            cache.store(2, vec![forecast("x"), forecast("y")]);
                        } else if let Some(hit) = cache.get(2) {
                            assert_eq!(hit.len(), 2);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
