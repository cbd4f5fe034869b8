//! Fleet Insight CLI
//!
//! Runs anomaly detection, composite diagnosis, correlation and capacity
//! forecasting over a metrics snapshot.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{composite, correlate, detect, forecast, scan};
use insight_lib::{InMemoryMetricsStore, InsightEngine, InsightLogger, MetricType};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Fleet Insight CLI
#[derive(Parser)]
#[command(name = "fleet-insight")]
#[command(author, version, about = "Statistical insights for fleet metrics", long_about = None)]
pub struct Cli {
    /// Metrics snapshot file (JSON)
    #[arg(long, short, env = "FLEET_INSIGHT_SNAPSHOT", global = true)]
    pub snapshot: Option<PathBuf>,

    /// Engine configuration file (defaults to ~/.config/fleet-insight/config.toml)
    #[arg(long, short, env = "FLEET_INSIGHT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate an entity's latest values against their recent windows
    Detect {
        /// Entity id
        entity: String,

        /// Metric types to evaluate (repeatable; defaults to the configured set)
        #[arg(long = "metric", short)]
        metrics: Vec<MetricType>,

        /// Override the anomaly z-score threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Diagnose simultaneous deviations for one entity or the whole fleet
    Composite {
        /// Entity id (all entities if omitted)
        entity: Option<String>,

        /// Override the minimum composite score reported
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Find entities whose metrics move together
    Correlate {
        /// Metric types to correlate (repeatable; defaults to the configured set)
        #[arg(long = "metric", short)]
        metrics: Vec<MetricType>,

        /// Override the minimum |r| reported
        #[arg(long)]
        threshold: Option<f64>,

        /// Override the lookback window in hours
        #[arg(long)]
        lookback_hours: Option<u64>,
    },

    /// Project capacity trends
    Forecast {
        /// Entity id (most urgent across the fleet if omitted)
        entity: Option<String>,

        /// Maximum number of fleet forecasts
        #[arg(long, short, default_value = "10")]
        limit: usize,

        /// Override the capacity ceiling
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run detection, diagnosis, correlation and forecasting in one pass
    Scan {
        /// Maximum number of fleet forecasts
        #[arg(long, short, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let mut engine_config = config::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Detect { threshold, .. } => {
            if let Some(threshold) = threshold {
                engine_config.anomaly.threshold = *threshold;
            }
        }
        Commands::Composite { min_score, .. } => {
            if let Some(min_score) = min_score {
                engine_config.composite.min_score = *min_score;
            }
        }
        Commands::Correlate {
            metrics,
            threshold,
            lookback_hours,
        } => {
            if !metrics.is_empty() {
                engine_config.correlation.tracked_metrics = metrics.clone();
            }
            if let Some(threshold) = threshold {
                engine_config.correlation.threshold = *threshold;
            }
            if let Some(hours) = lookback_hours {
                engine_config.correlation.lookback_hours = *hours;
            }
        }
        Commands::Forecast { threshold, .. } => {
            if let Some(threshold) = threshold {
                engine_config.forecast.threshold = *threshold;
            }
        }
        Commands::Scan { .. } => {}
    }

    let engine = InsightEngine::new(engine_config)
        .context("Invalid configuration")?
        .with_logger(InsightLogger::new("fleet-insight"));

    let snapshot = cli
        .snapshot
        .as_deref()
        .context("No metrics snapshot given; pass --snapshot <file> or set FLEET_INSIGHT_SNAPSHOT")?;
    let store = InMemoryMetricsStore::load_snapshot(snapshot)
        .await
        .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;
    info!(
        snapshot = %snapshot.display(),
        entities = store.len(),
        "Loaded metrics snapshot"
    );

    match cli.command {
        Commands::Detect {
            entity, metrics, ..
        } => {
            detect::detect(&engine, &store, &entity, metrics, cli.format).await?;
        }
        Commands::Composite { entity, .. } => {
            composite::composite(&engine, &store, entity, cli.format).await?;
        }
        Commands::Correlate { .. } => {
            correlate::correlate(&engine, &store, cli.format).await?;
        }
        Commands::Forecast { entity, limit, .. } => {
            forecast::forecast(&engine, &store, entity, limit, cli.format).await?;
        }
        Commands::Scan { limit } => {
            scan::scan(&engine, &store, limit, cli.format).await?;
        }
    }

    Ok(())
}
