//! Weighted score with asymmetric penalties.
//!
//! The score rewards improvements and punishes regressions much harder than
//! it rewards gains of the same size: a candidate that trades a large noise
//! reduction for blurred edges should lose to one that changes little.
//!
//! For each metric `m` with weight `w > 0` and delta `d` (percent, positive =
//! better):
//!
//! ```text
//! contribution = w * d                              if d >= 0
//! contribution = w * d * critical_multiplier        if d < 0 and m is critical
//! contribution = w * d * negative_multiplier        if d < 0 otherwise
//! score        = sum(contribution) - regression_deduction * #regressions
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analyzer::{Metric, MetricDelta};
use crate::error::{NoiseError, Result};

// Default configuration constants
pub const DEFAULT_NEGATIVE_MULTIPLIER: f64 = 5.0;
pub const DEFAULT_CRITICAL_MULTIPLIER: f64 = 20.0;
pub const DEFAULT_REGRESSION_DEDUCTION: f64 = 50.0;

/// Default metric weights; every other metric is disabled.
pub const DEFAULT_WEIGHTS: [(Metric, f64); 5] = [
    (Metric::Snr, 2.0),
    (Metric::NoiseSigmaMad, 1.0),
    (Metric::EdgeSharpness, 5.0),
    (Metric::LineSigmaH, 1.0),
    (Metric::AbnormalLines, 1.0),
];

/// Score function configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Weight per metric. Missing metrics have weight 0 (disabled).
    pub weights: BTreeMap<Metric, f64>,
    /// Metrics whose regressions use `critical_multiplier`.
    pub critical: BTreeSet<Metric>,
    /// Multiplier on regressions of non-critical metrics (>= 1).
    pub negative_multiplier: f64,
    /// Multiplier on regressions of critical metrics (>= 1).
    pub critical_multiplier: f64,
    /// Flat deduction per regressed metric (>= 0).
    pub regression_deduction: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS.into_iter().collect(),
            critical: BTreeSet::from([Metric::EdgeSharpness]),
            negative_multiplier: DEFAULT_NEGATIVE_MULTIPLIER,
            critical_multiplier: DEFAULT_CRITICAL_MULTIPLIER,
            regression_deduction: DEFAULT_REGRESSION_DEDUCTION,
        }
    }
}

impl ScoreConfig {
    /// Weight of `metric` (0 when unset).
    pub fn weight(&self, metric: Metric) -> f64 {
        self.weights.get(&metric).copied().unwrap_or(0.0)
    }

    /// Builder-style weight override.
    pub fn with_weight(mut self, metric: Metric, weight: f64) -> Self {
        self.weights.insert(metric, weight);
        self
    }

    /// Builder-style critical-set override.
    pub fn with_critical(mut self, metrics: impl IntoIterator<Item = Metric>) -> Self {
        self.critical = metrics.into_iter().collect();
        self
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn validate(&self) -> Result<()> {
        for (metric, &w) in &self.weights {
            if !w.is_finite() || w < 0.0 {
                return Err(NoiseError::invalid_config(format!(
                    "weight of {metric} must be finite and >= 0, got {w}"
                )));
            }
        }
        if self.total_weight() <= 0.0 {
            return Err(NoiseError::invalid_config(
                "score weights sum to zero; every candidate would tie",
            ));
        }
        for (name, m) in [
            ("negative_multiplier", self.negative_multiplier),
            ("critical_multiplier", self.critical_multiplier),
        ] {
            if !m.is_finite() || m < 1.0 {
                return Err(NoiseError::invalid_config(format!(
                    "{name} must be finite and >= 1, got {m}"
                )));
            }
        }
        if !self.regression_deduction.is_finite() || self.regression_deduction < 0.0 {
            return Err(NoiseError::invalid_config(format!(
                "regression_deduction must be finite and >= 0, got {}",
                self.regression_deduction
            )));
        }
        Ok(())
    }
}

/// Per-metric view of one score evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    /// Contribution of each weighted metric, after penalties.
    pub contributions: Vec<(Metric, f64)>,
    /// Everything subtracted because of regressions (multiplied part plus
    /// flat deductions).
    pub penalty: f64,
    pub regression_count: usize,
}

/// Validated score function.
#[derive(Debug, Clone)]
pub struct ScoreFunction {
    config: ScoreConfig,
}

impl ScoreFunction {
    pub fn new(config: ScoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// Scalar fitness of `delta`; higher is better.
    pub fn score(&self, delta: &MetricDelta) -> f64 {
        self.breakdown(delta).total
    }

    /// Score with per-metric detail.
    pub fn breakdown(&self, delta: &MetricDelta) -> ScoreBreakdown {
        let cfg = &self.config;
        let mut total = 0.0;
        let mut penalty = 0.0;
        let mut regression_count = 0;
        let mut contributions = Vec::new();

        for (&metric, &weight) in cfg.weights.iter().filter(|&(_, &w)| w > 0.0) {
            let d = delta.get(metric);
            let mut contribution = weight * d;
            if d < 0.0 {
                let multiplier = if cfg.critical.contains(&metric) {
                    cfg.critical_multiplier
                } else {
                    cfg.negative_multiplier
                };
                contribution *= multiplier;
                penalty += -contribution;
                regression_count += 1;
            }
            contributions.push((metric, contribution));
            total += contribution;
        }

        let deduction = regression_count as f64 * cfg.regression_deduction;
        ScoreBreakdown {
            total: total - deduction,
            contributions,
            penalty: penalty + deduction,
            regression_count,
        }
    }
}

/// Validate `config` and score `delta` with it.
pub fn score(delta: &MetricDelta, config: &ScoreConfig) -> Result<f64> {
    Ok(ScoreFunction::new(config.clone())?.score(delta))
}
