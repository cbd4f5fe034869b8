//! Capacity forecasting

use anyhow::{Context, Result};
use insight_lib::{CapacityForecast, InsightEngine, MetricsStore};
use tabled::Tabled;

use crate::output::{
    color_confidence, color_trend, entity_label, format_optional, print_results, OutputFormat,
};

#[derive(Tabled)]
pub struct ForecastRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Slope/h")]
    slope: String,
    #[tabled(rename = "R²")]
    r_squared: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Threshold In")]
    time_to_threshold: String,
}

pub fn forecast_rows(forecasts: &[CapacityForecast]) -> Vec<ForecastRow> {
    forecasts
        .iter()
        .map(|f| ForecastRow {
            entity: entity_label(&f.entity_id, f.display_name.as_deref()),
            metric: f.metric_type.to_string(),
            current: format!("{:.2}", f.current_value),
            trend: color_trend(f.trend),
            slope: format!("{:+.4}", f.slope),
            r_squared: format!("{:.3}", f.r_squared),
            confidence: color_confidence(f.confidence),
            time_to_threshold: format_optional(f.time_to_threshold_hours, "h"),
        })
        .collect()
}

/// Forecast one entity's tracked metrics, or the most urgent across the fleet
pub async fn forecast(
    engine: &InsightEngine,
    store: &dyn MetricsStore,
    entity: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let forecasts = match &entity {
        Some(entity_id) => engine
            .entity_forecasts(store, entity_id)
            .await
            .with_context(|| format!("Failed to forecast '{}'", entity_id))?,
        None => engine
            .fleet_forecast(store, limit)
            .await
            .context("Failed to forecast fleet capacity")?,
    };

    let title = match &entity {
        Some(entity_id) => format!("Capacity forecast for {}", entity_id),
        None => format!("Capacity forecast (top {})", limit),
    };
    print_results(&title, forecast_rows(&forecasts), &forecasts, format)
}
