//! Per-metric z-score detection
//!
//! Compares the current value of a metric against the mean and population
//! standard deviation of its most recent samples.

use crate::config::AnomalyConfig;
use crate::models::{round_to, AnomalyVerdict, MetricType, Sample, WindowStats};

/// Default number of recent samples forming the baseline
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Minimum samples required for a verdict
pub const MIN_SAMPLES_FOR_DETECTION: usize = 5;

impl WindowStats {
    /// Compute stats over the last `window` finite values of `samples`
    ///
    /// Returns `None` for an empty window.
    pub fn from_samples(samples: &[Sample], window: usize) -> Option<Self> {
        let start = samples.len().saturating_sub(window);
        let values: Vec<f64> = samples[start..]
            .iter()
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .collect();
        Self::from_values(&values)
    }

    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        // Population variance (divide by n, not n - 1)
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        Some(Self {
            mean,
            std_dev: if std_dev.is_finite() { std_dev } else { 0.0 },
            sample_count: values.len(),
        })
    }

    /// z-score of `value` against this window, 0 when the window is flat
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev < f64::EPSILON {
            return 0.0;
        }
        let z = (value - self.mean) / self.std_dev;
        if z.is_finite() {
            z
        } else {
            0.0
        }
    }
}

/// Flags values lying more than `threshold` standard deviations from the window mean
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    /// |z| strictly above this is anomalous
    pub threshold: f64,
    /// Number of most recent samples used as the baseline
    pub window_size: usize,
    pub min_samples: usize,
}

impl AnomalyDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self {
            threshold: config.threshold,
            window_size: config.window_size,
            min_samples: config.min_samples,
        }
    }

    /// Evaluate `current` against the most recent samples of a series
    ///
    /// # Returns
    /// * `Some(AnomalyVerdict)` whenever the window holds enough samples,
    ///   whether or not the value is anomalous
    /// * `None` when there is too little data or `current` is not finite
    pub fn evaluate(
        &self,
        entity_id: &str,
        metric_type: MetricType,
        window: &[Sample],
        current: f64,
    ) -> Option<AnomalyVerdict> {
        if !current.is_finite() {
            return None;
        }

        let stats = WindowStats::from_samples(window, self.window_size)?;
        if stats.sample_count < self.min_samples {
            return None;
        }

        let z_score = round_to(stats.z_score(current), 2);

        Some(AnomalyVerdict {
            entity_id: entity_id.to_string(),
            metric_type,
            current_value: current,
            mean: stats.mean,
            std_dev: stats.std_dev,
            z_score,
            is_anomalous: z_score.abs() > self.threshold,
        })
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            window_size: DEFAULT_WINDOW_SIZE,
            min_samples: MIN_SAMPLES_FOR_DETECTION,
        }
    }
}
