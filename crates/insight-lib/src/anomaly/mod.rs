//! Anomaly detection for entity metrics
//!
//! This module provides:
//! - Per-metric z-score verdicts against a recent window
//! - Composite scoring and pattern classification across an entity's metrics

mod composite;
mod detector;

pub use composite::{
    sort_by_score, CompositeScorer, PatternContext, PatternRule, PatternRules,
};
pub use detector::{AnomalyDetector, DEFAULT_WINDOW_SIZE, MIN_SAMPLES_FOR_DETECTION};
