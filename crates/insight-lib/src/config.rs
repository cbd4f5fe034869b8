//! Engine configuration
//!
//! Every classification gate is tunable policy. Defaults match the values
//! the engine has always shipped with.

use crate::error::{InsightError, Result};
use crate::models::MetricType;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub anomaly: AnomalyConfig,
    pub composite: CompositeConfig,
    pub correlation: CorrelationConfig,
    pub forecast: ForecastConfig,
}

impl EngineConfig {
    /// Reject thresholds that would make classification meaningless
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, f64); 8] = [
            ("anomaly.threshold", self.anomaly.threshold),
            ("composite.elevated_threshold", self.composite.elevated_threshold),
            ("composite.exhaustion_threshold", self.composite.exhaustion_threshold),
            ("composite.min_score", self.composite.min_score),
            ("correlation.threshold", self.correlation.threshold),
            ("forecast.threshold", self.forecast.threshold),
            ("forecast.horizon_hours", self.forecast.horizon_hours),
            ("forecast.lookback_hours", self.forecast.lookback_hours),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(InsightError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.anomaly.window_size < self.anomaly.min_samples {
            return Err(InsightError::InvalidConfig(format!(
                "anomaly.window_size ({}) must be at least anomaly.min_samples ({})",
                self.anomaly.window_size, self.anomaly.min_samples
            )));
        }
        if self.correlation.threshold > 1.0 {
            return Err(InsightError::InvalidConfig(
                "correlation.threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.correlation.bucket_width_secs == 0 {
            return Err(InsightError::InvalidConfig(
                "correlation.bucket_width_secs must be positive".to_string(),
            ));
        }
        if self.forecast.max_points < 2 {
            return Err(InsightError::InvalidConfig(
                "forecast.max_points must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// |z| strictly above this marks a standalone anomaly
    pub threshold: f64,
    /// Number of recent samples forming the baseline window
    pub window_size: usize,
    /// Windows smaller than this produce no verdict
    pub min_samples: usize,
    /// Metrics evaluated by an entity scan
    pub tracked_metrics: Vec<MetricType>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            window_size: 30,
            min_samples: 5,
            tracked_metrics: vec![MetricType::Cpu, MetricType::Memory, MetricType::MemoryBytes],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// |z| strictly above this makes a metric eligible for composite scoring
    pub elevated_threshold: f64,
    /// z strictly above this on both cpu and memory families means exhaustion
    pub exhaustion_threshold: f64,
    /// Composite results scoring below this are discarded
    pub min_score: f64,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            elevated_threshold: 1.0,
            exhaustion_threshold: 2.0,
            min_score: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Minimum |r| for a pair to be reported
    pub threshold: f64,
    /// Densest entities kept per metric type
    pub max_entities: usize,
    /// Pairs with fewer shared buckets are skipped
    pub min_aligned_points: usize,
    pub lookback_hours: u64,
    pub bucket_width_secs: u64,
    pub tracked_metrics: Vec<MetricType>,
}

impl CorrelationConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_hours.saturating_mul(3600))
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::from_secs(self.bucket_width_secs)
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            max_entities: 50,
            min_aligned_points: 5,
            lookback_hours: 24,
            bucket_width_secs: 5 * 60,
            tracked_metrics: vec![MetricType::Cpu, MetricType::Memory],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Ceiling used for time-to-threshold projection
    pub threshold: f64,
    /// Projection horizon
    pub horizon_hours: f64,
    /// Number of projected points across the horizon
    pub projected_points: usize,
    /// Trailing actual points included in the forecast series
    pub actual_points: usize,
    /// Series shorter than this produce no forecast
    pub min_samples: usize,
    /// Lookback for a single-series forecast
    pub lookback_hours: f64,
    /// Only time-to-threshold values within this many hours are reported
    pub max_time_to_threshold_hours: f64,
    /// Lookback used by the fleet-wide wrapper
    pub fleet_lookback_hours: u64,
    /// Series longer than this are downsampled before regression
    pub max_points: usize,
    /// How long fleet results stay cached
    pub cache_ttl_secs: u64,
    pub tracked_metrics: Vec<MetricType>,
}

impl ForecastConfig {
    pub fn fleet_lookback(&self) -> Duration {
        Duration::from_secs(self.fleet_lookback_hours.saturating_mul(3600))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            threshold: 90.0,
            horizon_hours: 24.0,
            projected_points: 12,
            actual_points: 5,
            min_samples: 5,
            lookback_hours: 24.0,
            max_time_to_threshold_hours: 168.0,
            fleet_lookback_hours: 6,
            max_points: 180,
            cache_ttl_secs: 5 * 60,
            tracked_metrics: vec![MetricType::Cpu, MetricType::Memory],
        }
    }
}
