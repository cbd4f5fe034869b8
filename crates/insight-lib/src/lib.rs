//! Statistical core for fleet monitoring insights
//!
//! This crate provides:
//! - Z-score anomaly detection per (entity, metric)
//! - Composite diagnosis of simultaneous deviations with ordered pattern rules
//! - Pearson correlation of bucketed series across entities
//! - Linear capacity forecasting with a fleet-wide cached wrapper
//! - A storage-agnostic `MetricsStore` seam, configuration and observability

pub mod anomaly;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod models;
pub mod observability;
pub mod store;

pub use anomaly::{AnomalyDetector, CompositeScorer, PatternRule, PatternRules};
pub use config::EngineConfig;
pub use correlation::CorrelationEngine;
pub use engine::{FleetScan, InsightEngine};
pub use error::{InsightError, Result, StoreError};
pub use forecast::{CapacityForecaster, FleetForecaster, ForecastCache};
pub use models::*;
pub use observability::{EngineMetrics, InsightLogger};
pub use store::{InMemoryMetricsStore, MetricsStore, Snapshot, SnapshotEntity};
