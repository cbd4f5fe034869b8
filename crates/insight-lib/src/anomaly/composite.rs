//! Composite scoring across an entity's concurrently elevated metrics
//!
//! Aggregates per-metric verdicts into a single diagnosis:
//! - RMS of elevated |z| values as the composite score
//! - Pattern classification through an ordered rule list (first match wins)
//! - Severity bucketing on the composite score

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::CompositeConfig;
use crate::models::{round_to, AnomalyVerdict, CompositeAnomaly, CompositeMetric, Pattern, Severity};

/// What a pattern predicate gets to look at
pub struct PatternContext<'a> {
    /// Every verdict supplied for the entity
    pub verdicts: &'a [AnomalyVerdict],
    /// Subset whose |z| passed the elevated gate
    pub elevated: &'a [CompositeMetric],
}

impl PatternContext<'_> {
    pub fn cpu_elevated(&self) -> bool {
        self.elevated.iter().any(|m| m.metric_type.is_cpu_family())
    }

    pub fn memory_elevated(&self) -> bool {
        self.elevated.iter().any(|m| m.metric_type.is_memory_family())
    }

    /// Any cpu-family verdict with a signed z strictly above `threshold`
    pub fn cpu_above(&self, threshold: f64) -> bool {
        self.verdicts
            .iter()
            .any(|v| v.metric_type.is_cpu_family() && v.z_score > threshold)
    }

    /// Any memory-family verdict with a signed z strictly above `threshold`
    pub fn memory_above(&self, threshold: f64) -> bool {
        self.verdicts
            .iter()
            .any(|v| v.metric_type.is_memory_family() && v.z_score > threshold)
    }
}

type Predicate = Box<dyn Fn(&PatternContext<'_>) -> bool + Send + Sync>;

/// A single (predicate, label) classification rule
pub struct PatternRule {
    pub pattern: Pattern,
    predicate: Predicate,
}

impl PatternRule {
    pub fn new<F>(pattern: Pattern, predicate: F) -> Self
    where
        F: Fn(&PatternContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            pattern,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, ctx: &PatternContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Ordered classification rules, evaluated top to bottom
#[derive(Debug, Default)]
pub struct PatternRules {
    rules: Vec<PatternRule>,
}

impl PatternRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in rules: exhaustion, then memory leak, then CPU spike
    pub fn standard(exhaustion_threshold: f64) -> Self {
        Self::new()
            .with_rule(PatternRule::new(Pattern::ResourceExhaustion, move |ctx| {
                ctx.cpu_above(exhaustion_threshold) && ctx.memory_above(exhaustion_threshold)
            }))
            .with_rule(PatternRule::new(Pattern::MemoryLeakSuspected, |ctx| {
                ctx.memory_elevated() && !ctx.cpu_elevated()
            }))
            .with_rule(PatternRule::new(Pattern::CpuSpike, |ctx| {
                ctx.cpu_elevated() && !ctx.memory_elevated()
            }))
    }

    /// Append a rule; it is consulted after every existing one
    pub fn with_rule(mut self, rule: PatternRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn classify(&self, ctx: &PatternContext<'_>) -> Option<Pattern> {
        self.rules.iter().find(|r| r.matches(ctx)).map(|r| r.pattern)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Turns an entity's verdicts into a single explainable diagnosis
#[derive(Debug)]
pub struct CompositeScorer {
    /// |z| strictly above this counts as elevated
    pub elevated_threshold: f64,
    /// Results scoring below this are dropped
    pub min_score: f64,
    rules: PatternRules,
}

impl CompositeScorer {
    pub fn new(config: &CompositeConfig) -> Self {
        Self {
            elevated_threshold: config.elevated_threshold,
            min_score: config.min_score,
            rules: PatternRules::standard(config.exhaustion_threshold),
        }
    }

    /// Replace the classification rules
    pub fn with_rules(mut self, rules: PatternRules) -> Self {
        self.rules = rules;
        self
    }

    /// Score one entity's verdicts
    ///
    /// Returns `None` when nothing is elevated or the score falls below the
    /// configured minimum.
    pub fn score(
        &self,
        entity_id: &str,
        verdicts: &[AnomalyVerdict],
        timestamp: DateTime<Utc>,
    ) -> Option<CompositeAnomaly> {
        let mut elevated: Vec<CompositeMetric> = verdicts
            .iter()
            .filter(|v| v.z_score.is_finite() && v.z_score.abs() > self.elevated_threshold)
            .map(|v| CompositeMetric {
                metric_type: v.metric_type,
                current_value: v.current_value,
                mean: v.mean,
                z_score: v.z_score,
            })
            .collect();

        if elevated.is_empty() {
            return None;
        }

        elevated.sort_by(|a, b| b.z_score.abs().total_cmp(&a.z_score.abs()));

        let composite_score = round_to(rms(elevated.iter().map(|m| m.z_score.abs())), 2);
        if composite_score < self.min_score {
            return None;
        }

        let pattern = self.rules.classify(&PatternContext {
            verdicts,
            elevated: &elevated,
        });

        Some(CompositeAnomaly {
            entity_id: entity_id.to_string(),
            metrics: elevated,
            composite_score,
            pattern,
            severity: Severity::from_score(composite_score),
            timestamp,
        })
    }

    /// Score every entity present in `verdicts`, highest score first
    pub fn score_fleet(
        &self,
        verdicts: &[AnomalyVerdict],
        timestamp: DateTime<Utc>,
    ) -> Vec<CompositeAnomaly> {
        let mut by_entity: BTreeMap<&str, Vec<AnomalyVerdict>> = BTreeMap::new();
        for verdict in verdicts {
            by_entity
                .entry(verdict.entity_id.as_str())
                .or_default()
                .push(verdict.clone());
        }

        let mut results: Vec<CompositeAnomaly> = by_entity
            .into_iter()
            .filter_map(|(entity_id, entity_verdicts)| {
                self.score(entity_id, &entity_verdicts, timestamp)
            })
            .collect();

        sort_by_score(&mut results);
        results
    }
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self::new(&CompositeConfig::default())
    }
}

/// Highest composite score first, ties by entity id
pub fn sort_by_score(results: &mut [CompositeAnomaly]) {
    results.sort_by(|a, b| {
        b.composite_score
            .total_cmp(&a.composite_score)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
}

fn rms(values: impl Iterator<Item = f64>) -> f64 {
    let (sum_sq, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
    if n == 0 {
        return 0.0;
    }
    (sum_sq / n as f64).sqrt()
}
