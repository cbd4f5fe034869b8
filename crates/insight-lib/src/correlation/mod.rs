//! Cross-entity correlation
//!
//! Finds entities whose bucketed series move together for the same metric
//! type, using Pearson correlation over shared buckets.

mod engine;
mod pearson;

pub use engine::{sort_pairs, CorrelationEngine, DEFAULT_MAX_ENTITIES, MIN_ALIGNED_POINTS};
pub use pearson::{align, pearson};
