//! Per-metric anomaly detection for one entity

use anyhow::{Context, Result};
use insight_lib::{AnomalyVerdict, InsightEngine, MetricType, MetricsStore};
use tabled::Tabled;

use crate::output::{color_z_score, print_results, OutputFormat};

#[derive(Tabled)]
pub struct VerdictRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
    #[tabled(rename = "Z-Score")]
    z_score: String,
    #[tabled(rename = "Anomalous")]
    anomalous: String,
}

pub fn verdict_rows(verdicts: &[AnomalyVerdict], threshold: f64) -> Vec<VerdictRow> {
    verdicts
        .iter()
        .map(|v| VerdictRow {
            entity: v.entity_id.clone(),
            metric: v.metric_type.to_string(),
            current: format!("{:.2}", v.current_value),
            mean: format!("{:.2}", v.mean),
            std_dev: format!("{:.2}", v.std_dev),
            z_score: color_z_score(v.z_score, threshold),
            anomalous: if v.is_anomalous { "yes" } else { "no" }.to_string(),
        })
        .collect()
}

/// Evaluate the latest value of each metric against its recent window
pub async fn detect(
    engine: &InsightEngine,
    store: &dyn MetricsStore,
    entity: &str,
    metrics: Vec<MetricType>,
    format: OutputFormat,
) -> Result<()> {
    let metrics = if metrics.is_empty() {
        engine.config().anomaly.tracked_metrics.clone()
    } else {
        metrics
    };

    let verdicts = engine
        .scan_entity(store, entity, &metrics)
        .await
        .with_context(|| format!("Failed to scan entity '{}'", entity))?;

    let rows = verdict_rows(&verdicts, engine.config().anomaly.threshold);
    print_results(
        &format!("Anomaly verdicts for {}", entity),
        rows,
        &verdicts,
        format,
    )
}
