//! Coordinate-wise hill climbing.
//!
//! Starting from the caller's parameters, each pass visits the parameters in
//! order and tries `current +/- step` (snapped to the grid). The better of the
//! two proposals is accepted immediately if it strictly improves the score.
//! A pass without any improvement shrinks every step by `step_decay`. The
//! search ends when every step is below its parameter's granularity or the
//! evaluation budget is spent. Points visited earlier reuse their recorded
//! score and are not charged to the budget.
//!
//! The search is fully deterministic: same inputs, same trace.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::analyzer::NoiseAnalyzer;
use crate::error::{NoiseError, Result};
use crate::filter::FilterCapability;
use crate::float_trait::NoiseFloat;
use crate::optimizer::{Evaluator, OptimizationResult, Optimizer};
use crate::params::{ParamSet, ParameterSpace};
use crate::score::ScoreConfig;

// Default configuration constants
pub const DEFAULT_INITIAL_STEP_FRACTION: f64 = 0.25;
pub const DEFAULT_STEP_DECAY: f64 = 0.5;

/// Hill-climbing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HillClimbingConfig {
    /// Initial step as a fraction of each parameter's range, in (0, 1].
    pub initial_step_fraction: f64,
    /// Step multiplier after a pass without improvement, in (0, 1).
    pub step_decay: f64,
}

impl Default for HillClimbingConfig {
    fn default() -> Self {
        Self {
            initial_step_fraction: DEFAULT_INITIAL_STEP_FRACTION,
            step_decay: DEFAULT_STEP_DECAY,
        }
    }
}

impl HillClimbingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_step_fraction > 0.0 && self.initial_step_fraction <= 1.0) {
            return Err(NoiseError::invalid_config(format!(
                "initial_step_fraction must be in (0, 1], got {}",
                self.initial_step_fraction
            )));
        }
        if !(self.step_decay > 0.0 && self.step_decay < 1.0) {
            return Err(NoiseError::invalid_config(format!(
                "step_decay must be in (0, 1), got {}",
                self.step_decay
            )));
        }
        Ok(())
    }
}

/// Local single-trajectory optimizer.
#[derive(Debug, Clone, Default)]
pub struct HillClimbing {
    config: HillClimbingConfig,
    analyzer: NoiseAnalyzer,
}

impl HillClimbing {
    pub fn new(config: HillClimbingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            analyzer: NoiseAnalyzer::default(),
        })
    }

    /// Use a custom analyzer for candidate comparison.
    pub fn with_analyzer(mut self, analyzer: NoiseAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &HillClimbingConfig {
        &self.config
    }
}

impl Optimizer for HillClimbing {
    fn optimize<F, C>(
        &self,
        filter: &C,
        original: ArrayView2<F>,
        initial: &ParamSet,
        space: &ParameterSpace,
        score_config: &ScoreConfig,
        max_evaluations: usize,
    ) -> Result<OptimizationResult>
    where
        F: NoiseFloat,
        C: FilterCapability<F> + ?Sized,
    {
        let mut eval = Evaluator::new(filter, original, &self.analyzer, space, score_config)?;
        let specs: Vec<_> = space.dimensions().map(|(_, spec)| spec).collect();

        log::info!(
            "hill climbing: {} parameters, budget {}",
            specs.len(),
            max_evaluations
        );

        let mut current = eval.starting_point(initial)?;
        let initial_score = eval.evaluate(&current)?;
        let mut best_score = initial_score;

        let mut steps: Vec<f64> = specs
            .iter()
            .map(|s| s.range() * self.config.initial_step_fraction)
            .collect();
        let mut used = 0usize;

        let mut exhausted = false;

        while !exhausted && steps.iter().zip(&specs).any(|(&st, s)| st >= s.step) {
            let mut improved = false;

            for (i, spec) in specs.iter().enumerate() {
                let delta = steps[i].max(spec.step);
                let mut accepted: Option<(Vec<f64>, f64)> = None;

                for direction in [1.0, -1.0] {
                    let mut candidate = current.clone();
                    candidate[i] = spec.snap(current[i] + direction * delta);
                    if candidate[i] == current[i] {
                        continue;
                    }
                    // Revisited points reuse their score and cost nothing
                    let score = match eval.cached(&candidate) {
                        Some(score) => score,
                        None if used >= max_evaluations => {
                            exhausted = true;
                            break;
                        }
                        None => {
                            used += 1;
                            eval.evaluate(&candidate)?
                        }
                    };

                    let beats_best = score > best_score;
                    let beats_other = accepted.as_ref().map_or(true, |(_, s)| score > *s);
                    if beats_best && beats_other {
                        accepted = Some((candidate, score));
                    }
                }

                // An improvement found before the budget ran out is kept
                if let Some((candidate, score)) = accepted {
                    log::debug!(
                        "hill climbing: {} {} -> {} (score {:.4} -> {:.4})",
                        spec.name,
                        current[i],
                        candidate[i],
                        best_score,
                        score
                    );
                    current = candidate;
                    best_score = score;
                    improved = true;
                }
                if exhausted {
                    break;
                }
            }

            if !improved && !exhausted {
                for st in steps.iter_mut() {
                    *st *= self.config.step_decay;
                }
            }
        }

        log::info!(
            "hill climbing finished: score {:.4} -> {:.4} after {} evaluations",
            initial_score,
            best_score,
            eval.evaluations()
        );
        Ok(eval.finish(&current, best_score, initial_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Metric;
    use crate::params::{FilterKind, ParamKind, ParameterSpec};
    use ndarray::Array2;
    use rand::prelude::*;
    use rand_distr::{Distribution, Normal};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noise_image(seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        Array2::from_shape_fn((32, 32), |_| 100.0 + normal.sample(&mut rng))
    }

    /// Noise gain grows with the distance of `sigma` from 1.2.
    fn bowl(params: &ParamSet, image: ArrayView2<f64>) -> Result<Array2<f64>> {
        let s = params.require(FilterKind::Wavelet, "sigma")?;
        let gain = 0.2 + (s - 1.2).abs();
        Ok(image.mapv(|v| 100.0 + (v - 100.0) * gain))
    }

    fn sigma_only() -> ScoreConfig {
        ScoreConfig {
            weights: BTreeMap::from([(Metric::NoiseSigma, 1.0)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_climbs_to_one_dimensional_optimum() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.1);
        let image = noise_image(1);

        let result = HillClimbing::default()
            .optimize(&bowl, image.view(), &initial, &space, &sigma_only(), 100)
            .unwrap();

        let best = result.best_params.get(FilterKind::Wavelet, "sigma").unwrap();
        assert!((best - 1.2).abs() <= 0.1 + 1e-9, "best = {best}");
        assert!(result.improved());
        assert_eq!(result.trace.len(), result.evaluations);
        assert_eq!(result.trace[0].score, result.initial_score);
    }

    #[test]
    fn test_budget_is_respected() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.1);
        let image = noise_image(2);

        let result = HillClimbing::default()
            .optimize(&bowl, image.view(), &initial, &space, &sigma_only(), 3)
            .unwrap();
        // Starting configuration plus at most 3 candidates
        assert!(result.evaluations <= 4);

        let zero = HillClimbing::default()
            .optimize(&bowl, image.view(), &initial, &space, &sigma_only(), 0)
            .unwrap();
        assert_eq!(zero.evaluations, 1);
        assert_eq!(zero.best_score, zero.initial_score);
    }

    #[test]
    fn test_budget_ending_mid_pass_keeps_improvement() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.6);
        let image = noise_image(4);

        // Only the upward proposal fits the budget
        let result = HillClimbing::default()
            .optimize(&bowl, image.view(), &initial, &space, &sigma_only(), 1)
            .unwrap();

        let trace_max = result
            .trace
            .iter()
            .map(|s| s.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.evaluations, 2);
        assert_eq!(result.best_score, trace_max);
        assert!(result.improved());
        let best = result.best_params.get(FilterKind::Wavelet, "sigma").unwrap();
        assert!((best - 1.1).abs() < 1e-9, "best = {best}");
    }

    #[test]
    fn test_best_is_best_of_trace() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 2.0);
        let image = noise_image(5);
        for budget in 0..8 {
            let result = HillClimbing::default()
                .optimize(&bowl, image.view(), &initial, &space, &sigma_only(), budget)
                .unwrap();
            let trace_max = result
                .trace
                .iter()
                .map(|s| s.score)
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(result.best_score, trace_max, "budget {budget}");
            assert!(result.evaluations <= budget + 1);
        }
    }

    #[test]
    fn test_revisited_points_are_not_re_evaluated() {
        let calls = AtomicUsize::new(0);
        let counting = |p: &ParamSet, image: ArrayView2<f64>| -> Result<Array2<f64>> {
            calls.fetch_add(1, Ordering::Relaxed);
            bowl(p, image)
        };
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.1);

        let result = HillClimbing::default()
            .optimize(&counting, noise_image(6).view(), &initial, &space, &sigma_only(), 100)
            .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), result.evaluations);
        for (i, a) in result.trace.iter().enumerate() {
            for b in &result.trace[i + 1..] {
                assert_ne!(a.params, b.params);
            }
        }
    }

    #[test]
    fn test_fixed_parameter_space_terminates() {
        let space = ParameterSpace::new(vec![(
            FilterKind::Wavelet,
            vec![ParameterSpec::new("sigma", ParamKind::Float, 0.5, 0.5, 0.1)],
        )])
        .unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.5);
        let result = HillClimbing::default()
            .optimize(&bowl, noise_image(3).view(), &initial, &space, &sigma_only(), 50)
            .unwrap();
        assert_eq!(result.evaluations, 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(HillClimbingConfig::default().validate().is_ok());
        let bad = HillClimbingConfig {
            step_decay: 1.0,
            ..Default::default()
        };
        assert!(HillClimbing::new(bad).is_err());
        let bad = HillClimbingConfig {
            initial_step_fraction: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
