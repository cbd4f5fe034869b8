//! Composite diagnosis of simultaneous deviations

use anyhow::{Context, Result};
use chrono::Utc;
use insight_lib::{CompositeAnomaly, InsightEngine, MetricsStore};
use tabled::Tabled;

use crate::output::{color_severity, print_results, OutputFormat};

#[derive(Tabled)]
pub struct CompositeRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Elevated Metrics")]
    metrics: String,
}

pub fn composite_rows(composites: &[CompositeAnomaly]) -> Vec<CompositeRow> {
    composites
        .iter()
        .map(|c| CompositeRow {
            entity: c.entity_id.clone(),
            score: format!("{:.2}", c.composite_score),
            severity: color_severity(c.severity),
            pattern: c
                .pattern
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            metrics: c
                .metrics
                .iter()
                .map(|m| format!("{} z={:+.2}", m.metric_type, m.z_score))
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect()
}

/// Diagnose one entity, or every entity when none is given
pub async fn composite(
    engine: &InsightEngine,
    store: &dyn MetricsStore,
    entity: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let composites = match &entity {
        Some(entity_id) => {
            let tracked = engine.config().anomaly.tracked_metrics.clone();
            let verdicts = engine
                .scan_entity(store, entity_id, &tracked)
                .await
                .with_context(|| format!("Failed to scan entity '{}'", entity_id))?;
            engine
                .composite(entity_id, &verdicts, Utc::now())
                .into_iter()
                .collect::<Vec<_>>()
        }
        None => {
            engine
                .scan_fleet(store)
                .await
                .context("Failed to scan fleet")?
                .composites
        }
    };

    let title = match &entity {
        Some(entity_id) => format!("Composite anomalies for {}", entity_id),
        None => "Composite anomalies".to_string(),
    };
    print_results(&title, composite_rows(&composites), &composites, format)
}
