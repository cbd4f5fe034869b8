//! Fleet-wide capacity discovery
//!
//! Runs the single-series forecaster over every qualifying (entity, metric)
//! of a batched fleet read and ranks the results by urgency.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::forecaster::CapacityForecaster;
use crate::config::ForecastConfig;
use crate::models::{CapacityForecast, EntityMetrics, MetricType, Sample, Trend};

/// Default point budget per series before downsampling
pub const DEFAULT_MAX_POINTS: usize = 180;

#[derive(Debug, Clone)]
pub struct FleetForecaster {
    pub forecaster: CapacityForecaster,
    /// Series longer than this are downsampled by fixed stride
    pub max_points: usize,
    pub tracked_metrics: Vec<MetricType>,
}

impl FleetForecaster {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            forecaster: CapacityForecaster::from_config(config),
            max_points: config.max_points,
            tracked_metrics: config.tracked_metrics.clone(),
        }
    }

    /// Forecast every qualifying series and keep the `limit` most urgent
    pub fn forecast_fleet(
        &self,
        fleet: &HashMap<String, EntityMetrics>,
        limit: usize,
    ) -> Vec<CapacityForecast> {
        let mut results = Vec::new();

        for (entity_id, metrics) in fleet {
            for metric_type in &self.tracked_metrics {
                let Some(series) = metrics.series.get(metric_type) else {
                    continue;
                };
                if series.len() < self.forecaster.min_samples {
                    continue;
                }

                let sampled = downsample(series, self.max_points);
                if let Some(mut forecast) =
                    self.forecaster.forecast(entity_id, *metric_type, &sampled)
                {
                    forecast.display_name = metrics.display_name.clone();
                    results.push(forecast);
                }
            }
        }

        rank(&mut results);
        results.truncate(limit);
        results
    }
}

impl Default for FleetForecaster {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

/// Keep every `stride`-th sample so at most `budget` remain
///
/// The newest sample is always kept so the current value stays exact.
pub fn downsample(samples: &[Sample], budget: usize) -> Vec<Sample> {
    if samples.len() <= budget || budget < 2 {
        return samples.to_vec();
    }

    let stride = samples.len().div_ceil(budget);
    let mut picked: Vec<Sample> = samples.iter().step_by(stride).copied().collect();

    let last_index = samples.len() - 1;
    if last_index % stride != 0 {
        if picked.len() >= budget {
            picked.pop();
        }
        picked.push(samples[last_index]);
    }
    picked
}

/// Increasing trends first, then soonest threshold crossing; no crossing sorts last
pub fn rank(results: &mut [CapacityForecast]) {
    results.sort_by(|a, b| {
        let a_inc = a.trend == Trend::Increasing;
        let b_inc = b.trend == Trend::Increasing;
        b_inc
            .cmp(&a_inc)
            .then_with(|| compare_time_to_threshold(a.time_to_threshold_hours, b.time_to_threshold_hours))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
            .then_with(|| a.metric_type.cmp(&b.metric_type))
    });
}

fn compare_time_to_threshold(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn minutes(values: impl IntoIterator<Item = f64>) -> Vec<Sample> {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Sample::new(start + Duration::minutes(i as i64 * 30), v))
            .collect()
    }

    fn entity(series: Vec<(MetricType, Vec<Sample>)>) -> EntityMetrics {
        EntityMetrics {
            display_name: None,
            series: series.into_iter().collect(),
        }
    }

    #[test]
    fn test_downsample_respects_budget_and_keeps_last() {
        let samples = minutes((0..1000).map(|i| i as f64));
        let sampled = downsample(&samples, 180);

        assert!(sampled.len() <= 180);
        assert_eq!(sampled.first().unwrap().value, 0.0);
        assert_eq!(sampled.last().unwrap().value, 999.0);
        assert!(sampled.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_downsample_short_series_untouched() {
        let samples = minutes((0..50).map(|i| i as f64));
        assert_eq!(downsample(&samples, 180), samples);
    }

    #[test]
    fn test_fleet_ranking() {
        let mut fleet = HashMap::new();
        // 2/h from 81, crosses 90 in 4.5h
        fleet.insert(
            "fast".to_string(),
            entity(vec![(MetricType::Cpu, minutes((0..12).map(|i| 70.0 + i as f64)))]),
        );
        // 1/h from 25.5, crosses in 64.5h
        fleet.insert(
            "slow".to_string(),
            entity(vec![(MetricType::Cpu, minutes((0..12).map(|i| 20.0 + 0.5 * i as f64)))]),
        );
        // Rising but beyond the reporting window
        fleet.insert(
            "rising-far".to_string(),
            entity(vec![(MetricType::Memory, minutes((0..12).map(|i| 1.0 + 0.1 * i as f64)))]),
        );
        fleet.insert(
            "falling".to_string(),
            entity(vec![(MetricType::Cpu, minutes((0..12).map(|i| 80.0 - 2.0 * i as f64)))]),
        );

        let results = FleetForecaster::default().forecast_fleet(&fleet, 10);
        let ids: Vec<&str> = results.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["fast", "slow", "rising-far", "falling"]);
    }

    #[test]
    fn test_fleet_skips_sparse_and_untracked() {
        let mut fleet = HashMap::new();
        fleet.insert(
            "sparse".to_string(),
            entity(vec![(MetricType::Cpu, minutes([10.0, 20.0, 30.0]))]),
        );
        fleet.insert(
            "untracked".to_string(),
            entity(vec![(MetricType::Disk, minutes((0..20).map(|i| i as f64)))]),
        );

        assert!(FleetForecaster::default().forecast_fleet(&fleet, 10).is_empty());
    }

    #[test]
    fn test_fleet_truncates_and_carries_display_name() {
        let mut fleet = HashMap::new();
        for i in 0..5 {
            fleet.insert(
                format!("e{}", i),
                EntityMetrics {
                    display_name: Some(format!("container {}", i)),
                    series: [(
                        MetricType::Cpu,
                        minutes((0..10).map(move |j| 10.0 * i as f64 + j as f64)),
                    )]
                    .into_iter()
                    .collect(),
                },
            );
        }

        let results = FleetForecaster::default().forecast_fleet(&fleet, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].entity_id, "e4");
        assert_eq!(results[0].display_name.as_deref(), Some("container 4"));
    }
}
