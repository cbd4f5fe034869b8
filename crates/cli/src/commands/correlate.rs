//! Cross-entity correlation

use anyhow::{Context, Result};
use insight_lib::{CorrelationPair, InsightEngine, MetricsStore};
use tabled::Tabled;

use crate::output::{color_strength, entity_label, print_results, OutputFormat};

#[derive(Tabled)]
pub struct CorrelationRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Entity A")]
    entity_a: String,
    #[tabled(rename = "Entity B")]
    entity_b: String,
    #[tabled(rename = "r")]
    correlation: String,
    #[tabled(rename = "Strength")]
    strength: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Points")]
    points: usize,
}

pub fn correlation_rows(pairs: &[CorrelationPair]) -> Vec<CorrelationRow> {
    pairs
        .iter()
        .map(|p| CorrelationRow {
            metric: p.metric_type.to_string(),
            entity_a: entity_label(&p.entity_a, p.entity_a_name.as_deref()),
            entity_b: entity_label(&p.entity_b, p.entity_b_name.as_deref()),
            correlation: format!("{:+.3}", p.correlation),
            strength: color_strength(p.strength),
            direction: p.direction.to_string(),
            points: p.sample_count,
        })
        .collect()
}

/// Strongly correlated entity pairs for every tracked metric type
pub async fn correlate(
    engine: &InsightEngine,
    store: &dyn MetricsStore,
    format: OutputFormat,
) -> Result<()> {
    let pairs = engine
        .correlations(store)
        .await
        .context("Failed to correlate fleet metrics")?;

    print_results("Correlated entities", correlation_rows(&pairs), &pairs, format)
}
