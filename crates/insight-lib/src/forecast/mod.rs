//! Capacity forecasting
//!
//! This module provides:
//! - Least-squares trend fitting over elapsed hours
//! - Single-series projection with time-to-threshold estimation
//! - Fleet-wide discovery with downsampling, ranking and a TTL cache

mod cache;
mod fleet;
mod forecaster;
mod regression;

pub use cache::{ForecastCache, DEFAULT_CACHE_TTL};
pub use fleet::{downsample, rank, FleetForecaster, DEFAULT_MAX_POINTS};
pub use forecaster::{
    classify_confidence, classify_trend, CapacityForecaster, MIN_SAMPLES_FOR_FORECAST,
    STABLE_SLOPE_PER_HOUR,
};
pub use regression::{fit, to_hours, LinearFit};
