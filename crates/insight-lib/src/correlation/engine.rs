//! Cross-entity correlation for one metric type
//!
//! Restricts the fleet to its densest entities, then correlates every
//! unordered pair on their shared buckets and keeps the strong ones.

use std::collections::HashSet;

use tracing::debug;

use super::pearson::{align, pearson};
use crate::config::CorrelationConfig;
use crate::models::{
    round_to, CorrelationDirection, CorrelationPair, CorrelationStrength, EntitySeries, MetricType,
};

/// Default number of entities considered per metric type
pub const DEFAULT_MAX_ENTITIES: usize = 50;

/// Pairs sharing fewer buckets than this are skipped
pub const MIN_ALIGNED_POINTS: usize = 5;

#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    /// Minimum |r| reported
    pub threshold: f64,
    pub max_entities: usize,
    pub min_aligned_points: usize,
}

impl CorrelationEngine {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn from_config(config: &CorrelationConfig) -> Self {
        Self {
            threshold: config.threshold,
            max_entities: config.max_entities,
            min_aligned_points: config.min_aligned_points,
        }
    }

    /// Correlate all entity pairs for a single metric type
    ///
    /// Output is sorted by |correlation| descending.
    pub fn correlate(&self, metric_type: MetricType, series: &[EntitySeries]) -> Vec<CorrelationPair> {
        let selected = self.densest(series);
        let mut pairs = Vec::new();
        let mut skipped = 0usize;

        for (i, a) in selected.iter().enumerate() {
            for b in selected.iter().skip(i + 1) {
                if a.entity_id == b.entity_id {
                    continue;
                }

                let (xs, ys) = align(&a.samples, &b.samples);
                if xs.len() < self.min_aligned_points.max(2) {
                    skipped += 1;
                    continue;
                }

                let correlation = round_to(pearson(&xs, &ys), 3).clamp(-1.0, 1.0);
                let strength = CorrelationStrength::classify(correlation);
                if correlation.abs() < self.threshold || !strength.is_strong() {
                    continue;
                }

                pairs.push(CorrelationPair {
                    entity_a: a.entity_id.clone(),
                    entity_a_name: a.display_name.clone(),
                    entity_b: b.entity_id.clone(),
                    entity_b_name: b.display_name.clone(),
                    metric_type,
                    correlation,
                    strength,
                    direction: CorrelationDirection::of(correlation),
                    sample_count: xs.len(),
                });
            }
        }

        debug!(
            metric_type = %metric_type,
            entities = series.len(),
            considered = selected.len(),
            skipped_pairs = skipped,
            correlated_pairs = pairs.len(),
            "Correlation pass complete"
        );

        sort_pairs(&mut pairs);
        pairs
    }

    /// Run several metric types independently and merge, strongest first
    pub fn correlate_all(&self, by_metric: &[(MetricType, Vec<EntitySeries>)]) -> Vec<CorrelationPair> {
        let mut pairs: Vec<CorrelationPair> = by_metric
            .iter()
            .flat_map(|(metric_type, series)| self.correlate(*metric_type, series))
            .collect();
        sort_pairs(&mut pairs);
        pairs
    }

    /// Top entities by sample count, ties by entity id
    fn densest<'a>(&self, series: &'a [EntitySeries]) -> Vec<&'a EntitySeries> {
        let mut ranked: Vec<&EntitySeries> = series.iter().collect();
        ranked.sort_by(|a, b| {
            b.samples
                .len()
                .cmp(&a.samples.len())
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        let mut seen: HashSet<String> = HashSet::new();
        ranked.retain(|s| seen.insert(s.entity_id.clone()));
        ranked.truncate(self.max_entities);
        ranked
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            max_entities: DEFAULT_MAX_ENTITIES,
            min_aligned_points: MIN_ALIGNED_POINTS,
        }
    }
}

/// Strongest |r| first; ties by metric type, then entity ids
pub fn sort_pairs(pairs: &mut [CorrelationPair]) {
    pairs.sort_by(|a, b| {
        b.correlation
            .abs()
            .total_cmp(&a.correlation.abs())
            .then_with(|| a.metric_type.cmp(&b.metric_type))
            .then_with(|| a.entity_a.cmp(&b.entity_a))
            .then_with(|| a.entity_b.cmp(&b.entity_b))
    });
}
