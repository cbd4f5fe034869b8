//! Single-series capacity forecasting
//!
//! Fits a first-order trend to one (entity, metric) series and projects it
//! over a short horizon, estimating when the metric crosses a ceiling.

use chrono::Duration as ChronoDuration;

use super::regression::{fit, to_hours, LinearFit};
use crate::config::ForecastConfig;
use crate::models::{
    round_to, CapacityForecast, Confidence, ForecastPoint, MetricType, Sample, Trend,
};

/// Series shorter than this produce no forecast
pub const MIN_SAMPLES_FOR_FORECAST: usize = 5;

/// |slope| per hour below which a series is considered stable
pub const STABLE_SLOPE_PER_HOUR: f64 = 0.1;

/// Projects linear trends for one (entity, metric) series
#[derive(Debug, Clone)]
pub struct CapacityForecaster {
    /// Ceiling for time-to-threshold
    pub threshold: f64,
    pub horizon_hours: f64,
    pub projected_points: usize,
    pub actual_points: usize,
    pub min_samples: usize,
    /// Samples older than this relative to the newest one are ignored
    pub lookback_hours: f64,
    pub max_time_to_threshold_hours: f64,
}

impl CapacityForecaster {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            threshold: config.threshold,
            horizon_hours: config.horizon_hours,
            projected_points: config.projected_points,
            actual_points: config.actual_points,
            min_samples: config.min_samples.max(2),
            lookback_hours: config.lookback_hours,
            max_time_to_threshold_hours: config.max_time_to_threshold_hours,
        }
    }

    /// Forecast a single series
    ///
    /// # Returns
    /// * `None` when fewer than `min_samples` finite samples fall inside the lookback
    pub fn forecast(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        samples: &[Sample],
    ) -> Option<CapacityForecast> {
        let window = self.window(samples);
        if window.len() < self.min_samples {
            return None;
        }

        let last = *window.last()?;
        let points = to_hours(&window);
        let line = fit(&points);
        let last_x = points.last().map(|(x, _)| *x).unwrap_or(0.0);
        let current_value = last.value;

        let forecast_points = self.forecast_points(metric_type, &window, &line, last_x);

        Some(CapacityForecast {
            entity_id: entity_id.to_string(),
            display_name: None,
            metric_type,
            current_value,
            trend: classify_trend(line.slope),
            slope: round_to(line.slope, 4),
            r_squared: round_to(line.r_squared, 3),
            forecast_points,
            time_to_threshold_hours: self.time_to_threshold(current_value, line.slope),
            confidence: classify_confidence(line.r_squared, window.len()),
        })
    }

    /// Hours until `current` reaches the threshold at `slope` per hour
    ///
    /// Only reported for rising series still below the ceiling, and only when
    /// the crossing lies within the reporting window.
    pub fn time_to_threshold(&self, current: f64, slope: f64) -> Option<f64> {
        if slope <= 0.0 || current >= self.threshold {
            return None;
        }
        let hours = (self.threshold - current) / slope;
        if !hours.is_finite() {
            return None;
        }
        let hours = round_to(hours, 1);
        (hours > 0.0 && hours <= self.max_time_to_threshold_hours).then_some(hours)
    }

    /// Finite samples within the lookback, ascending by time
    fn window(&self, samples: &[Sample]) -> Vec<Sample> {
        let mut window: Vec<Sample> = samples
            .iter()
            .copied()
            .filter(|s| s.value.is_finite())
            .collect();
        if !window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
            window.sort_by_key(|s| s.timestamp);
        }

        if let Some(newest) = window.last().map(|s| s.timestamp) {
            // A lookback reaching past the representable range keeps everything
            if let Some(cutoff) =
                hours_to_delta(self.lookback_hours).and_then(|d| newest.checked_sub_signed(d))
            {
                window.retain(|s| s.timestamp >= cutoff);
            }
        }
        window
    }

    fn forecast_points(
        &self,
        metric_type: MetricType,
        window: &[Sample],
        line: &LinearFit,
        last_x: f64,
    ) -> Vec<ForecastPoint> {
        let actual = self.actual_points.min(window.len());
        let mut points: Vec<ForecastPoint> = window[window.len() - actual..]
            .iter()
            .map(|s| ForecastPoint {
                timestamp: s.timestamp,
                value: s.value,
                is_projected: false,
            })
            .collect();

        let Some(last) = window.last() else {
            return points;
        };

        let steps = self.projected_points.max(1) as f64;
        for i in 1..=self.projected_points {
            let offset_hours = self.horizon_hours * i as f64 / steps;
            let Some(timestamp) =
                hours_to_delta(offset_hours).and_then(|d| last.timestamp.checked_add_signed(d))
            else {
                break;
            };
            let value = metric_type.clamp_value(line.predict(last_x + offset_hours));
            points.push(ForecastPoint {
                timestamp,
                value: round_to(value, 2),
                is_projected: true,
            });
        }

        points
    }
}

impl Default for CapacityForecaster {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

/// Fractional hours as a chrono delta, `None` when out of range
fn hours_to_delta(hours: f64) -> Option<ChronoDuration> {
    let millis = hours * 3_600_000.0;
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    ChronoDuration::try_milliseconds(millis as i64)
}

pub fn classify_trend(slope: f64) -> Trend {
    if slope.abs() < STABLE_SLOPE_PER_HOUR {
        Trend::Stable
    } else if slope > 0.0 {
        Trend::Increasing
    } else {
        Trend::Decreasing
    }
}

pub fn classify_confidence(r_squared: f64, sample_count: usize) -> Confidence {
    if r_squared > 0.7 && sample_count > 20 {
        Confidence::High
    } else if r_squared > 0.4 && sample_count > 10 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
