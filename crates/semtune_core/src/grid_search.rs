//! Coarse-to-fine grid search.
//!
//! Phase 1 samples `levels` evenly spaced values per parameter over the full
//! bounds and evaluates the Cartesian product. If that product does not fit
//! the evaluation budget the search fails up front with
//! `SearchSpaceTooLarge`. Phase 2 repeatedly shrinks each sampling window
//! around the best point found so far and evaluates the new product, until
//! the rounds run out, every window is narrower than its parameter's
//! granularity, or the next round would exceed the remaining budget.
//!
//! Points already evaluated are not re-run. Within a phase, candidates can be
//! scored in parallel; results are consumed in enumeration order so the
//! outcome matches a sequential run exactly.

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analyzer::NoiseAnalyzer;
use crate::error::{NoiseError, Result};
use crate::filter::FilterCapability;
use crate::float_trait::NoiseFloat;
use crate::optimizer::{Evaluator, OptimizationResult, Optimizer};
use crate::params::{ParamSet, ParameterSpace, ParameterSpec};
use crate::score::ScoreConfig;

// Default configuration constants
pub const DEFAULT_LEVELS: usize = 3;
pub const DEFAULT_SHRINK: f64 = 0.5;
pub const DEFAULT_REFINEMENT_ROUNDS: usize = 3;

/// Grid-search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    /// Samples per parameter and round (>= 1).
    pub levels: usize,
    /// Window width factor per refinement round, in (0, 1).
    pub shrink: f64,
    /// Number of Phase-2 rounds.
    pub refinement_rounds: usize,
    /// Score the candidates of a round on the rayon pool.
    pub parallel: bool,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            shrink: DEFAULT_SHRINK,
            refinement_rounds: DEFAULT_REFINEMENT_ROUNDS,
            parallel: true,
        }
    }
}

impl GridSearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(NoiseError::invalid_config("levels must be >= 1"));
        }
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(NoiseError::invalid_config(format!(
                "shrink must be in (0, 1), got {}",
                self.shrink
            )));
        }
        Ok(())
    }
}

/// Evenly spaced snapped samples over `[lo, hi]`, ascending, no duplicates.
fn sample_axis(spec: &ParameterSpec, lo: f64, hi: f64, levels: usize) -> Vec<f64> {
    let mut values: Vec<f64> = if levels == 1 {
        vec![spec.snap(0.5 * (lo + hi))]
    } else {
        (0..levels)
            .map(|k| spec.snap(lo + (hi - lo) * k as f64 / (levels - 1) as f64))
            .collect()
    };
    values.dedup();
    values
}

/// Cartesian product in lexicographic order (first axis slowest).
fn cartesian(axes: &[Vec<f64>]) -> Vec<Vec<f64>> {
    axes.iter().fold(vec![Vec::new()], |acc, axis| {
        acc.iter()
            .flat_map(|prefix| {
                axis.iter().map(move |&v| {
                    let mut point = prefix.clone();
                    point.push(v);
                    point
                })
            })
            .collect()
    })
}

/// Product size, saturating.
fn product_len(axes: &[Vec<f64>]) -> usize {
    axes.iter()
        .fold(1usize, |acc, axis| acc.saturating_mul(axis.len()))
}

/// Euclidean distance between two points in normalized coordinates.
fn normalized_distance(specs: &[&ParameterSpec], a: &[f64], b: &[f64]) -> f64 {
    specs
        .iter()
        .zip(a.iter().zip(b))
        .map(|(s, (&x, &y))| {
            let d = s.normalize(x) - s.normalize(y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Multi-resolution exhaustive optimizer.
#[derive(Debug, Clone, Default)]
pub struct GridSearch {
    config: GridSearchConfig,
    analyzer: NoiseAnalyzer,
}

impl GridSearch {
    pub fn new(config: GridSearchConfig) -> Result<Self> {
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

    pub fn config(&self) -> &GridSearchConfig {
        &self.config
    }

    /// Evaluate one round of candidates and update the running best.
    ///
    /// The incumbent only loses to a strictly higher score, or to an equal
    /// score closer to the previous best.
    fn run_phase<F, C>(
        &self,
        eval: &mut Evaluator<'_, '_, F, C>,
        specs: &[&ParameterSpec],
        candidates: Vec<Vec<f64>>,
        best: &mut (Vec<f64>, f64),
    ) -> Result<()>
    where
        F: NoiseFloat,
        C: FilterCapability<F> + ?Sized,
    {
        let fresh: Vec<&Vec<f64>> = candidates
            .iter()
            .filter(|p| eval.cached(p).is_none())
            .collect();

        let scores: Vec<Result<f64>> = {
            let shared = &*eval;
            if self.config.parallel {
                fresh.par_iter().map(|p| shared.score_point(p)).collect()
            } else {
                fresh.iter().map(|p| shared.score_point(p)).collect()
            }
        };
        for (point, score) in fresh.iter().zip(scores) {
            eval.record(point, score?);
        }

        let previous = best.0.clone();
        let mut best_distance = 0.0;
        for point in &candidates {
            let Some(score) = eval.cached(point) else {
                continue;
            };
            let distance = normalized_distance(specs, point, &previous);
            if score > best.1 || (score == best.1 && distance < best_distance) {
                log::debug!("grid search: new best {score:.4} at {point:?}");
                *best = (point.clone(), score);
                best_distance = distance;
            }
        }
        Ok(())
    }
}

impl Optimizer for GridSearch {
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
        let specs: Vec<&ParameterSpec> = space.dimensions().map(|(_, spec)| spec).collect();
        let levels = self.config.levels;

        // Phase 1 must fit the budget before anything is evaluated
        let coarse_axes: Vec<Vec<f64>> = specs
            .iter()
            .map(|s| sample_axis(s, s.min, s.max, levels))
            .collect();
        let required = product_len(&coarse_axes);
        if required > max_evaluations {
            return Err(NoiseError::SearchSpaceTooLarge {
                required,
                budget: max_evaluations,
            });
        }

        let mut eval = Evaluator::new(filter, original, &self.analyzer, space, score_config)?;
        log::info!(
            "grid search: {} parameters, {} coarse candidates, budget {}",
            specs.len(),
            required,
            max_evaluations
        );

        let start = eval.starting_point(initial)?;
        let initial_score = eval.evaluate(&start)?;
        let mut best = (start, initial_score);
        // The starting evaluation does not count against the budget
        let budget_base = eval.evaluations();

        self.run_phase(&mut eval, &specs, cartesian(&coarse_axes), &mut best)?;

        let mut widths: Vec<f64> = specs.iter().map(|s| s.range()).collect();
        for round in 0..self.config.refinement_rounds {
            for w in widths.iter_mut() {
                *w *= self.config.shrink;
            }
            if widths.iter().zip(&specs).all(|(&w, s)| w < s.step) {
                log::debug!("grid search: windows below granularity after {round} rounds");
                break;
            }

            let axes: Vec<Vec<f64>> = specs
                .iter()
                .zip(&widths)
                .zip(&best.0)
                .map(|((s, &w), &center)| {
                    let lo = (center - 0.5 * w).max(s.min);
                    let hi = (center + 0.5 * w).min(s.max);
                    sample_axis(s, lo, hi, levels)
                })
                .collect();
            let candidates = cartesian(&axes);
            let fresh = candidates
                .iter()
                .filter(|p| eval.cached(p).is_none())
                .count();
            let used = eval.evaluations() - budget_base;
            if fresh > max_evaluations.saturating_sub(used) {
                log::debug!(
                    "grid search: round {} needs {fresh} evaluations, {} left",
                    round + 1,
                    max_evaluations.saturating_sub(used)
                );
                break;
            }
            self.run_phase(&mut eval, &specs, candidates, &mut best)?;
        }

        log::info!(
            "grid search finished: score {:.4} -> {:.4} after {} evaluations",
            initial_score,
            best.1,
            eval.evaluations()
        );
        Ok(eval.finish(&best.0, best.1, initial_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Metric;
    use crate::params::{FilterKind, ParamKind};
    use ndarray::Array2;
    use rand::prelude::*;
    use rand_distr::{Distribution, Normal};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noise_image() -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(99);
        let normal = Normal::new(0.0, 1.0).unwrap();
        Array2::from_shape_fn((24, 24), |_| 50.0 + normal.sample(&mut rng))
    }

    fn bowl(params: &ParamSet, image: ArrayView2<f64>) -> Result<Array2<f64>> {
        let s = params.require(FilterKind::Wavelet, "sigma")?;
        let gain = 0.2 + (s - 1.4).abs();
        Ok(image.mapv(|v| 50.0 + (v - 50.0) * gain))
    }

    fn sigma_only() -> ScoreConfig {
        ScoreConfig {
            weights: BTreeMap::from([(Metric::NoiseSigma, 1.0)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_sample_axis() {
        let spec = ParameterSpec::new("d", ParamKind::OddInteger, 3.0, 15.0, 2.0);
        assert_eq!(sample_axis(&spec, 3.0, 15.0, 3), vec![3.0, 9.0, 15.0]);
        // Narrow window collapses duplicates
        assert_eq!(sample_axis(&spec, 8.5, 9.5, 3), vec![9.0]);
        assert_eq!(sample_axis(&spec, 3.0, 15.0, 1), vec![9.0]);
    }

    #[test]
    fn test_cartesian_order() {
        let axes = vec![vec![1.0, 2.0], vec![10.0, 20.0, 30.0]];
        let product = cartesian(&axes);
        assert_eq!(product.len(), product_len(&axes));
        assert_eq!(product[0], vec![1.0, 10.0]);
        assert_eq!(product[1], vec![1.0, 20.0]);
        assert_eq!(product[3], vec![2.0, 10.0]);
        assert_eq!(cartesian(&[]), vec![Vec::<f64>::new()]);
    }

    #[test]
    fn test_too_large_fails_before_evaluating() {
        let calls = AtomicUsize::new(0);
        let counting = |p: &ParamSet, image: ArrayView2<f64>| -> Result<Array2<f64>> {
            calls.fetch_add(1, Ordering::Relaxed);
            bowl(p, image)
        };
        let space = ParameterSpace::for_filters(&[FilterKind::Fourier]).unwrap();
        let initial = space.default_params();
        // 3 x 3 x 3 = 27 coarse points
        let err = GridSearch::default()
            .optimize(&counting, noise_image().view(), &initial, &space, &sigma_only(), 26)
            .unwrap_err();
        assert_eq!(
            err,
            NoiseError::SearchSpaceTooLarge {
                required: 27,
                budget: 26
            }
        );
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_refines_toward_optimum() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.1);
        let result = GridSearch::default()
            .optimize(&bowl, noise_image().view(), &initial, &space, &sigma_only(), 50)
            .unwrap();
        let best = result.best_params.get(FilterKind::Wavelet, "sigma").unwrap();
        assert!((best - 1.4).abs() <= 0.2 + 1e-9, "best = {best}");
        assert!(result.improved());
        assert!(result.evaluations <= 51);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 0.1);
        let image = noise_image();
        let run = |parallel: bool| {
            let config = GridSearchConfig {
                parallel,
                ..Default::default()
            };
            GridSearch::new(config)
                .unwrap()
                .optimize(&bowl, image.view(), &initial, &space, &sigma_only(), 50)
                .unwrap()
        };
        assert_eq!(run(true), run(false));
    }

    #[test]
    fn test_initial_configuration_can_win() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        // 1.4 is not on the coarse grid {0.1, 1.0 or 1.1, 2.0}
        let initial = ParamSet::new().with(FilterKind::Wavelet, "sigma", 1.4);
        let config = GridSearchConfig {
            refinement_rounds: 0,
            ..Default::default()
        };
        let result = GridSearch::new(config)
            .unwrap()
            .optimize(&bowl, noise_image().view(), &initial, &space, &sigma_only(), 10)
            .unwrap();
        assert_eq!(result.best_score, result.initial_score);
        assert!((result.best_params.get(FilterKind::Wavelet, "sigma").unwrap() - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_config_validation() {
        assert!(GridSearchConfig::default().validate().is_ok());
        let bad = GridSearchConfig {
            levels: 0,
            ..Default::default()
        };
        assert!(GridSearch::new(bad).is_err());
        let bad = GridSearchConfig {
            shrink: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
