//! Filter capability contract.
//!
//! The optimizers never filter pixels themselves. They call a
//! [`FilterCapability`], which turns a parameter set and an input image into an
//! output image. Two implementations are provided:
//!
//! - any closure `Fn(&ParamSet, ArrayView2<F>) -> Result<Array2<F>>`,
//! - [`Pipeline`]: an ordered list of [`FilterKind`] stages dispatched by tag
//!   to a [`FilterBackend`].
//!
//! Implementations must be pure and must reject out-of-range values with
//! `ParameterOutOfRange` instead of clamping them.

use ndarray::{Array2, ArrayView2};

use crate::error::{NoiseError, Result};
use crate::float_trait::NoiseFloat;
use crate::params::{FilterKind, FilterParams, ParamSet, ParameterSpace};

/// Renders a candidate image for a parameter set.
pub trait FilterCapability<F: NoiseFloat>: Sync {
    fn apply(&self, params: &ParamSet, image: ArrayView2<F>) -> Result<Array2<F>>;
}

impl<F, T> FilterCapability<F> for T
where
    F: NoiseFloat,
    T: Fn(&ParamSet, ArrayView2<F>) -> Result<Array2<F>> + Sync,
{
    fn apply(&self, params: &ParamSet, image: ArrayView2<F>) -> Result<Array2<F>> {
        self(params, image)
    }
}

/// Pixel-level implementation of the filter kinds, supplied by the host.
pub trait FilterBackend<F: NoiseFloat>: Sync {
    /// Apply one filter. `params` holds exactly the parameters declared for
    /// `kind`, already checked against their specs.
    fn apply_filter(
        &self,
        kind: FilterKind,
        params: &FilterParams,
        image: ArrayView2<F>,
    ) -> Result<Array2<F>>;
}

/// A fixed sequence of filters applied in order.
#[derive(Debug, Clone)]
pub struct Pipeline<B> {
    stages: Vec<FilterKind>,
    space: ParameterSpace,
    backend: B,
}

impl<B> Pipeline<B> {
    /// Pipeline over the built-in parameter spaces of `stages`.
    pub fn new(stages: Vec<FilterKind>, backend: B) -> Result<Self> {
        let space = ParameterSpace::for_filters(&stages)?;
        Ok(Self {
            stages,
            space,
            backend,
        })
    }

    /// Pipeline with a custom parameter space. Every stage needs a group in
    /// `space`.
    pub fn with_space(stages: Vec<FilterKind>, space: ParameterSpace, backend: B) -> Result<Self> {
        if let Some(kind) = stages.iter().find(|k| space.specs(**k).is_none()) {
            return Err(NoiseError::invalid_config(format!(
                "no parameter space declared for stage '{kind}'"
            )));
        }
        Ok(Self {
            stages,
            space,
            backend,
        })
    }

    pub fn stages(&self) -> &[FilterKind] {
        &self.stages
    }

    /// The space the optimizers should search.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Default parameters of every stage.
    pub fn default_params(&self) -> ParamSet {
        self.space.default_params()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<F: NoiseFloat, B: FilterBackend<F>> FilterCapability<F> for Pipeline<B> {
    fn apply(&self, params: &ParamSet, image: ArrayView2<F>) -> Result<Array2<F>> {
        let mut current = image.to_owned();
        for &kind in &self.stages {
            let specs = self.space.specs(kind).unwrap_or(&[]);
            let mut stage_params = FilterParams::new();
            for spec in specs {
                let value = params.require(kind, &spec.name)?;
                spec.check(kind.name(), value)?;
                stage_params.insert(spec.name.clone(), value);
            }

            let output = self
                .backend
                .apply_filter(kind, &stage_params, current.view())?;
            if output.dim() != current.dim() {
                return Err(NoiseError::invalid_input(format!(
                    "filter '{kind}' changed the image shape from {:?} to {:?}",
                    current.dim(),
                    output.dim()
                )));
            }
            current = output;
        }
        Ok(current)
    }
}
