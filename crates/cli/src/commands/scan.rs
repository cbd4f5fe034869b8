//! Full insight cycle over the fleet

use anyhow::{Context, Result};
use insight_lib::{
    AnomalyVerdict, CapacityForecast, CompositeAnomaly, CorrelationPair, InsightEngine,
    MetricsStore,
};
use serde::Serialize;

use super::composite::composite_rows;
use super::correlate::correlation_rows;
use super::detect::verdict_rows;
use super::forecast::forecast_rows;
use crate::output::{print_info, print_json, print_results, OutputFormat};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport {
    entities: usize,
    anomalies: Vec<AnomalyVerdict>,
    composites: Vec<CompositeAnomaly>,
    correlations: Vec<CorrelationPair>,
    forecasts: Vec<CapacityForecast>,
}

/// Detect, diagnose, correlate and forecast in one pass
pub async fn scan(
    engine: &InsightEngine,
    store: &dyn MetricsStore,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let fleet = engine.scan_fleet(store).await.context("Failed to scan fleet")?;
    let correlations = engine
        .correlations(store)
        .await
        .context("Failed to correlate fleet metrics")?;
    let forecasts = engine
        .fleet_forecast(store, limit)
        .await
        .context("Failed to forecast fleet capacity")?;

    let entities = store
        .list_entities()
        .await
        .context("Failed to list entities")?
        .len();

    let verdict_count = fleet.verdicts.len();
    let report = ScanReport {
        entities,
        anomalies: fleet.anomalies().cloned().collect(),
        composites: fleet.composites,
        correlations,
        forecasts,
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_info(&format!(
                "Scanned {} entities, {} verdicts",
                report.entities, verdict_count
            ));
            println!();
            let threshold = engine.config().anomaly.threshold;
            print_results("Anomalies", verdict_rows(&report.anomalies, threshold), &report.anomalies, format)?;
            println!();
            print_results("Composite anomalies", composite_rows(&report.composites), &report.composites, format)?;
            println!();
            print_results("Correlated entities", correlation_rows(&report.correlations), &report.correlations, format)?;
            println!();
            print_results("Capacity forecast", forecast_rows(&report.forecasts), &report.forecasts, format)?;
        }
    }

    Ok(())
}
