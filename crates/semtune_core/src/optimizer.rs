//! Shared evaluation loop for the parameter optimizers.
//!
//! Every candidate goes through the same steps: snap onto the grid, re-check
//! the bounds, render it with the filter capability, compare the result with
//! the original image and reduce the delta to a score. [`Evaluator`] owns that
//! loop together with the evaluation count and the trace, so the search
//! strategies only decide which points to try.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::analyzer::{MetricDelta, NoiseAnalyzer, NoiseReport};
use crate::error::{NoiseError, Result};
use crate::filter::FilterCapability;
use crate::float_trait::NoiseFloat;
use crate::image::prepare;
use crate::params::{ParamSet, ParameterSpace};
use crate::score::{ScoreConfig, ScoreFunction};

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    pub params: ParamSet,
    pub score: f64,
}

/// Outcome of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best_params: ParamSet,
    pub best_score: f64,
    /// Score of the starting configuration.
    pub initial_score: f64,
    /// Filter evaluations performed, including the starting configuration.
    pub evaluations: usize,
    /// Every evaluation in order; the first sample is the starting
    /// configuration.
    pub trace: Vec<TraceSample>,
}

impl OptimizationResult {
    /// Whether the search found something strictly better than the start.
    pub fn improved(&self) -> bool {
        self.best_score > self.initial_score
    }
}

/// Common entry point of the search strategies.
pub trait Optimizer {
    /// Tune `initial` inside `space` to maximize the score of
    /// `filter(params, original)` against `original`.
    ///
    /// `max_evaluations` bounds the candidates tried after the starting
    /// configuration, which is always evaluated first.
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
        C: FilterCapability<F> + ?Sized;
}

/// Bit-exact key of a flat parameter vector.
fn point_key(point: &[f64]) -> Vec<u64> {
    point.iter().map(|v| v.to_bits()).collect()
}

/// Runs and records candidate evaluations for one optimization.
pub(crate) struct Evaluator<'a, 'v, F: NoiseFloat, C: ?Sized> {
    filter: &'a C,
    original: ArrayView2<'v, F>,
    original_f64: Array2<f64>,
    baseline: NoiseReport,
    analyzer: &'a NoiseAnalyzer,
    scorer: ScoreFunction,
    space: &'a ParameterSpace,
    evaluations: usize,
    trace: Vec<TraceSample>,
    seen: HashMap<Vec<u64>, f64>,
}

impl<'a, 'v, F, C> Evaluator<'a, 'v, F, C>
where
    F: NoiseFloat,
    C: FilterCapability<F> + ?Sized,
{
    pub(crate) fn new(
        filter: &'a C,
        original: ArrayView2<'v, F>,
        analyzer: &'a NoiseAnalyzer,
        space: &'a ParameterSpace,
        score_config: &ScoreConfig,
    ) -> Result<Self> {
        let scorer = ScoreFunction::new(score_config.clone())?;
        let original_f64 = prepare(original)?;
        let baseline = analyzer.baseline_impl(original_f64.view());
        Ok(Self {
            filter,
            original,
            original_f64,
            baseline,
            analyzer,
            scorer,
            space,
            evaluations: 0,
            trace: Vec::new(),
            seen: HashMap::new(),
        })
    }

    /// Flatten and snap the caller's starting parameters.
    pub(crate) fn starting_point(&self, initial: &ParamSet) -> Result<Vec<f64>> {
        let flat = self.space.flatten(initial)?;
        Ok(self.space.snap(&flat))
    }

    /// Score a point without recording it. Pure, so phases may call it in
    /// parallel.
    pub(crate) fn score_point(&self, point: &[f64]) -> Result<f64> {
        let snapped = self.space.snap(point);
        self.space.check(&snapped)?;
        let params = self.space.unflatten(&snapped);

        let processed = self.filter.apply(&params, self.original)?;
        if processed.dim() != self.original.dim() {
            return Err(NoiseError::invalid_input(format!(
                "filter output {:?} does not match input {:?}",
                processed.dim(),
                self.original.dim()
            )));
        }
        let processed = prepare(processed.view())?;
        let after = self
            .analyzer
            .candidate_impl(self.original_f64.view(), processed.view());
        let delta = MetricDelta::between(&self.baseline, &after);
        Ok(self.scorer.score(&delta))
    }

    /// Record an evaluated point.
    pub(crate) fn record(&mut self, point: &[f64], score: f64) {
        let snapped = self.space.snap(point);
        self.evaluations += 1;
        self.seen.insert(point_key(&snapped), score);
        let params = self.space.unflatten(&snapped);
        log::trace!("evaluation {}: score={score:.4} [{params}]", self.evaluations);
        self.trace.push(TraceSample { params, score });
    }

    /// Score and record one point.
    pub(crate) fn evaluate(&mut self, point: &[f64]) -> Result<f64> {
        let score = self.score_point(point)?;
        self.record(point, score);
        Ok(score)
    }

    /// Score of an already evaluated (snapped) point.
    pub(crate) fn cached(&self, point: &[f64]) -> Option<f64> {
        self.seen.get(&point_key(&self.space.snap(point))).copied()
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub(crate) fn finish(self, best: &[f64], best_score: f64, initial_score: f64) -> OptimizationResult {
        OptimizationResult {
            best_params: self.space.unflatten(&self.space.snap(best)),
            best_score,
            initial_score,
            evaluations: self.evaluations,
            trace: self.trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FilterKind;
    use ndarray::Array2;

    fn gain_filter(params: &ParamSet, image: ArrayView2<f64>) -> Result<Array2<f64>> {
        let g = params.require(FilterKind::Wavelet, "sigma")?;
        Ok(image.mapv(|v| v * g))
    }

    #[test]
    fn test_evaluator_records_trace() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let analyzer = NoiseAnalyzer::default();
        let image = Array2::from_shape_fn((16, 16), |(r, c)| ((r * 7 + c * 3) % 11) as f64);
        let mut eval = Evaluator::new(
            &gain_filter,
            image.view(),
            &analyzer,
            &space,
            &ScoreConfig::default(),
        )
        .unwrap();

        // Off-grid input is snapped before evaluation
        let s = eval.evaluate(&[1.04]).unwrap();
        assert!(s.is_finite());
        assert_eq!(eval.evaluations(), 1);
        assert_eq!(eval.cached(&[1.0]), Some(s));
        assert_eq!(eval.cached(&[0.5]), None);

        let result = eval.finish(&[1.0], s, s);
        assert_eq!(result.trace.len(), 1);
        assert!(!result.improved());
        assert!((result.best_params.get(FilterKind::Wavelet, "sigma").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_score_config_fails_early() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let analyzer = NoiseAnalyzer::default();
        let image = Array2::<f64>::zeros((4, 4));
        let cfg = ScoreConfig {
            weights: Default::default(),
            ..Default::default()
        };
        assert!(Evaluator::new(&gain_filter, image.view(), &analyzer, &space, &cfg).is_err());
    }

    #[test]
    fn test_shape_changing_filter_is_rejected() {
        let space = ParameterSpace::for_filters(&[FilterKind::Wavelet]).unwrap();
        let analyzer = NoiseAnalyzer::default();
        let image = Array2::<f64>::ones((4, 4));
        let crop = |_: &ParamSet, image: ArrayView2<f64>| -> Result<Array2<f64>> {
            Ok(image.slice(ndarray::s![..2, ..]).to_owned())
        };
        let eval = Evaluator::new(&crop, image.view(), &analyzer, &space, &ScoreConfig::default())
            .unwrap();
        assert!(matches!(
            eval.score_point(&[1.0]),
            Err(NoiseError::InvalidInput(_))
        ));
    }
}
