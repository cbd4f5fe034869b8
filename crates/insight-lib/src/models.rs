//! Core data models for the insight engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of metric tracked per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// CPU utilisation in percent
    Cpu,
    /// Memory utilisation in percent
    Memory,
    /// Resident memory in bytes
    MemoryBytes,
    NetworkRxBytes,
    NetworkTxBytes,
    /// Disk utilisation in percent
    Disk,
}

impl MetricType {
    pub const ALL: [MetricType; 6] = [
        MetricType::Cpu,
        MetricType::Memory,
        MetricType::MemoryBytes,
        MetricType::NetworkRxBytes,
        MetricType::NetworkTxBytes,
        MetricType::Disk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cpu => "cpu",
            MetricType::Memory => "memory",
            MetricType::MemoryBytes => "memory_bytes",
            MetricType::NetworkRxBytes => "network_rx_bytes",
            MetricType::NetworkTxBytes => "network_tx_bytes",
            MetricType::Disk => "disk",
        }
    }

    /// Whether values are expressed as a percentage
    pub fn is_percentage(&self) -> bool {
        matches!(self, MetricType::Cpu | MetricType::Memory | MetricType::Disk)
    }

    pub fn is_cpu_family(&self) -> bool {
        matches!(self, MetricType::Cpu)
    }

    /// Memory family covers both percentage and absolute-bytes memory
    pub fn is_memory_family(&self) -> bool {
        matches!(self, MetricType::Memory | MetricType::MemoryBytes)
    }

    /// Range that projected values are clamped into
    pub fn valid_range(&self) -> (f64, f64) {
        if self.is_percentage() {
            (0.0, 100.0)
        } else {
            (0.0, f64::MAX)
        }
    }

    /// Clamp a value into the metric's valid range
    pub fn clamp_value(&self, value: f64) -> f64 {
        let (min, max) = self.valid_range();
        value.clamp(min, max)
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric type: {}", s))
    }
}

/// A single metric observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Timestamp-ascending samples for one (entity, metric)
pub type Series = Vec<Sample>;

/// A series for one entity as returned by fleet-wide reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeries {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub samples: Series,
}

/// Every tracked series for one entity, as returned by a batched fleet read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub series: HashMap<MetricType, Series>,
}

/// Mean and population standard deviation over a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

/// Outcome of evaluating one (entity, metric) against its window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyVerdict {
    pub entity_id: String,
    pub metric_type: MetricType,
    pub current_value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub is_anomalous: bool,
}

/// Strength bucket for a correlation coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl CorrelationStrength {
    /// Classify on |r| with fixed >= boundaries
    pub fn classify(r: f64) -> Self {
        let abs = r.abs();
        if abs >= 0.9 {
            CorrelationStrength::VeryStrong
        } else if abs >= 0.7 {
            CorrelationStrength::Strong
        } else if abs >= 0.4 {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Weak
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(
            self,
            CorrelationStrength::Strong | CorrelationStrength::VeryStrong
        )
    }
}

impl fmt::Display for CorrelationStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationStrength::Weak => write!(f, "weak"),
            CorrelationStrength::Moderate => write!(f, "moderate"),
            CorrelationStrength::Strong => write!(f, "strong"),
            CorrelationStrength::VeryStrong => write!(f, "very_strong"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

impl CorrelationDirection {
    pub fn of(r: f64) -> Self {
        if r > 0.0 {
            CorrelationDirection::Positive
        } else {
            CorrelationDirection::Negative
        }
    }
}

impl fmt::Display for CorrelationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationDirection::Positive => write!(f, "positive"),
            CorrelationDirection::Negative => write!(f, "negative"),
        }
    }
}

/// Two entities whose bucketed series move together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationPair {
    pub entity_a: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_a_name: Option<String>,
    pub entity_b: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_b_name: Option<String>,
    pub metric_type: MetricType,
    pub correlation: f64,
    pub strength: CorrelationStrength,
    pub direction: CorrelationDirection,
    pub sample_count: usize,
}

/// Named diagnosis for a combination of elevated metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    #[serde(rename = "Resource Exhaustion")]
    ResourceExhaustion,
    #[serde(rename = "Memory Leak Suspected")]
    MemoryLeakSuspected,
    #[serde(rename = "CPU Spike")]
    CpuSpike,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::ResourceExhaustion => write!(f, "Resource Exhaustion"),
            Pattern::MemoryLeakSuspected => write!(f, "Memory Leak Suspected"),
            Pattern::CpuSpike => write!(f, "CPU Spike"),
        }
    }
}

/// Severity levels for composite anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Bucket a composite score with fixed >= boundaries
    pub fn from_score(score: f64) -> Self {
        if score >= 5.0 {
            Severity::Critical
        } else if score >= 3.5 {
            Severity::High
        } else if score >= 2.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One elevated metric contributing to a composite anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeMetric {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub current_value: f64,
    pub mean: f64,
    pub z_score: f64,
}

/// Single diagnosis aggregating an entity's concurrent deviations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeAnomaly {
    pub entity_id: String,
    pub metrics: Vec<CompositeMetric>,
    pub composite_score: f64,
    pub pattern: Option<Pattern>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl CompositeAnomaly {
    /// Human-readable explanation of the diagnosis
    pub fn summary(&self) -> String {
        let metrics = self
            .metrics
            .iter()
            .map(|m| format!("{} z={:.2}", m.metric_type, m.z_score))
            .collect::<Vec<_>>()
            .join(", ");
        let label = self
            .pattern
            .map(|p| p.to_string())
            .unwrap_or_else(|| "Concurrent deviation".to_string());
        format!(
            "{}: {} (score {:.2}, {})",
            label, metrics, self.composite_score, self.severity
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub is_projected: bool,
}

/// Linear trend projection for one (entity, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityForecast {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub metric_type: MetricType,
    pub current_value: f64,
    pub trend: Trend,
    /// Change per hour
    pub slope: f64,
    pub r_squared: f64,
    pub forecast_points: Vec<ForecastPoint>,
    pub time_to_threshold_hours: Option<f64>,
    pub confidence: Confidence,
}

/// Round to a fixed number of decimals, mapping non-finite input to 0
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    // Too large to carry fractional digits anyway
    if !scaled.is_finite() {
        return value;
    }
    let rounded = scaled.round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
