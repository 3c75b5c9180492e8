//! Tunable parameter declarations.
//!
//! A [`ParameterSpec`] declares one parameter: numeric kind, inclusive bounds
//! and grid step. Legal values are `min + k * step` for integer `k` inside the
//! bounds. A [`ParameterSpace`] groups the specs of every filter in a
//! pipeline; [`ParamSet`] holds concrete values keyed by filter and name.
//!
//! The optimizers work on flat vectors ordered like
//! [`ParameterSpace::dimensions`] and convert at the boundaries with
//! [`ParameterSpace::flatten`] / [`ParameterSpace::unflatten`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NoiseError, Result};

/// Relative tolerance for on-grid checks, in units of the step.
const GRID_TOLERANCE: f64 = 1e-6;

/// Numeric kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Integer,
    Float,
    /// Integer restricted to odd values (window sizes).
    OddInteger,
}

/// Declaration of one tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    /// Discretization granularity.
    pub step: f64,
}

fn is_integral(v: f64) -> bool {
    v.fract() == 0.0
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            min,
            max,
            step,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |why: &str| {
            Err(NoiseError::invalid_config(format!(
                "parameter '{}': {why}",
                self.name
            )))
        };
        if self.name.is_empty() {
            return Err(NoiseError::invalid_config("parameter name is empty"));
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return fail("bounds and step must be finite");
        }
        if self.min > self.max {
            return fail("min exceeds max");
        }
        if self.step <= 0.0 {
            return fail("step must be positive");
        }
        match self.kind {
            ParamKind::Float => {}
            ParamKind::Integer => {
                if !(is_integral(self.min) && is_integral(self.max) && is_integral(self.step)) {
                    return fail("integer parameter needs integral min, max and step");
                }
            }
            ParamKind::OddInteger => {
                if !(is_integral(self.min) && is_integral(self.step)) {
                    return fail("odd parameter needs integral min and step");
                }
                if self.min.rem_euclid(2.0) != 1.0 || self.step.rem_euclid(2.0) != 0.0 {
                    return fail("odd parameter needs an odd min and an even step");
                }
            }
        }
        Ok(())
    }

    /// Width of the bounds.
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Number of legal values.
    pub fn grid_len(&self) -> usize {
        ((self.range() / self.step) + GRID_TOLERANCE).floor() as usize + 1
    }

    /// The `k`-th legal value (clamped to the last one).
    pub fn grid_value(&self, k: usize) -> f64 {
        let k = k.min(self.grid_len() - 1);
        let v = self.min + k as f64 * self.step;
        match self.kind {
            ParamKind::Float => v,
            ParamKind::Integer | ParamKind::OddInteger => v.round(),
        }
    }

    /// Nearest legal value to `value`. Non-finite input maps to `min`.
    pub fn snap(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.grid_value(0);
        }
        let k = ((value - self.min) / self.step).round();
        let last = (self.grid_len() - 1) as f64;
        self.grid_value(k.clamp(0.0, last) as usize)
    }

    /// Whether `value` is inside the bounds and on the grid.
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let tol = GRID_TOLERANCE * self.step;
        if value < self.min - tol || value > self.max + tol {
            return false;
        }
        let k = (value - self.min) / self.step;
        if (k - k.round()).abs() > GRID_TOLERANCE {
            return false;
        }
        match self.kind {
            ParamKind::Float => true,
            ParamKind::Integer => is_integral(value),
            ParamKind::OddInteger => is_integral(value) && value.rem_euclid(2.0) == 1.0,
        }
    }

    /// Fail with `ParameterOutOfRange` unless [`contains`](Self::contains).
    pub fn check(&self, filter: &str, value: f64) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(NoiseError::ParameterOutOfRange {
                filter: filter.to_string(),
                name: self.name.clone(),
                value,
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Position of `value` inside the bounds, in [0, 1].
    pub fn normalize(&self, value: f64) -> f64 {
        let range = self.range();
        if range <= 0.0 {
            0.0
        } else {
            ((value - self.min) / range).clamp(0.0, 1.0)
        }
    }
}

// =============================================================================
// Filter kinds
// =============================================================================

/// The closed set of denoising filters a pipeline can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Bilateral,
    NonLocalMeans,
    Wavelet,
    Fourier,
    LineWise,
    Notch,
    AnisotropicDiffusion,
}

impl FilterKind {
    pub const ALL: [FilterKind; 7] = [
        FilterKind::Bilateral,
        FilterKind::NonLocalMeans,
        FilterKind::Wavelet,
        FilterKind::Fourier,
        FilterKind::LineWise,
        FilterKind::Notch,
        FilterKind::AnisotropicDiffusion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Bilateral => "bilateral",
            FilterKind::NonLocalMeans => "non_local_means",
            FilterKind::Wavelet => "wavelet",
            FilterKind::Fourier => "fourier",
            FilterKind::LineWise => "line_wise",
            FilterKind::Notch => "notch",
            FilterKind::AnisotropicDiffusion => "anisotropic_diffusion",
        }
    }

    /// Built-in tuning space of this filter.
    pub fn default_specs(self) -> Vec<ParameterSpec> {
        use ParamKind::*;
        let p = ParameterSpec::new;
        match self {
            FilterKind::Bilateral => vec![
                p("d", OddInteger, 3.0, 15.0, 2.0),
                p("sigma_color", Float, 10.0, 100.0, 10.0),
                p("sigma_space", Float, 10.0, 100.0, 10.0),
            ],
            FilterKind::NonLocalMeans => vec![
                p("h", Float, 0.5, 15.0, 0.5),
                p("template_window", OddInteger, 3.0, 11.0, 2.0),
                p("search_window", OddInteger, 7.0, 21.0, 2.0),
            ],
            FilterKind::Wavelet => vec![p("sigma", Float, 0.1, 2.0, 0.1)],
            FilterKind::Fourier => vec![
                p("cutoff", Float, 0.1, 0.9, 0.1),
                p("order", Integer, 1.0, 8.0, 1.0),
                p("bandwidth", Float, 0.05, 0.3, 0.05),
            ],
            FilterKind::LineWise => vec![
                p("window_size", OddInteger, 3.0, 31.0, 2.0),
                p("strength", Float, 0.0, 1.0, 0.05),
            ],
            FilterKind::Notch => vec![
                p("center_freq", Float, 0.1, 0.5, 0.05),
                p("bandwidth", Float, 0.01, 0.2, 0.02),
                p("num_notches", Integer, 1.0, 5.0, 1.0),
            ],
            FilterKind::AnisotropicDiffusion => vec![
                p("iterations", Integer, 5.0, 30.0, 5.0),
                p("kappa", Float, 10.0, 100.0, 10.0),
                p("gamma", Float, 0.05, 0.25, 0.05),
            ],
        }
    }

    /// Interactive defaults of this filter, before snapping to the tuning grid.
    pub fn default_values(self) -> Vec<(&'static str, f64)> {
        match self {
            FilterKind::Bilateral => vec![("d", 9.0), ("sigma_color", 75.0), ("sigma_space", 75.0)],
            FilterKind::NonLocalMeans => {
                vec![("h", 10.0), ("template_window", 7.0), ("search_window", 21.0)]
            }
            FilterKind::Wavelet => vec![("sigma", 0.0)],
            FilterKind::Fourier => vec![("cutoff", 0.3), ("order", 2.0), ("bandwidth", 0.1)],
            FilterKind::LineWise => vec![("window_size", 5.0), ("strength", 1.0)],
            FilterKind::Notch => vec![("center_freq", 0.25), ("bandwidth", 0.05), ("num_notches", 1.0)],
            FilterKind::AnisotropicDiffusion => {
                vec![("iterations", 10.0), ("kappa", 30.0), ("gamma", 0.1)]
            }
        }
    }

    /// Default values snapped onto the built-in tuning grid.
    pub fn default_params(self) -> FilterParams {
        let specs = self.default_specs();
        self.default_values()
            .into_iter()
            .filter_map(|(name, v)| {
                specs
                    .iter()
                    .find(|s| s.name == name)
                    .map(|s| (name.to_string(), s.snap(v)))
            })
            .collect()
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Parameter sets and spaces
// =============================================================================

/// Values of one filter's parameters by name.
pub type FilterParams = BTreeMap<String, f64>;

/// Concrete parameter values for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: BTreeMap<FilterKind, FilterParams>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: FilterKind, name: impl Into<String>, value: f64) {
        self.values.entry(kind).or_default().insert(name.into(), value);
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, kind: FilterKind, name: impl Into<String>, value: f64) -> Self {
        self.set(kind, name, value);
        self
    }

    pub fn get(&self, kind: FilterKind, name: &str) -> Option<f64> {
        self.values.get(&kind).and_then(|p| p.get(name)).copied()
    }

    /// Like [`get`](Self::get) but missing values are an `InvalidConfig` error.
    pub fn require(&self, kind: FilterKind, name: &str) -> Result<f64> {
        self.get(kind, name).ok_or_else(|| {
            NoiseError::invalid_config(format!("missing parameter '{kind}.{name}'"))
        })
    }

    /// All values of one filter.
    pub fn filter(&self, kind: FilterKind) -> Option<&FilterParams> {
        self.values.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKind, &str, f64)> + '_ {
        self.values
            .iter()
            .flat_map(|(&k, p)| p.iter().map(move |(n, &v)| (k, n.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|p| p.is_empty())
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, name, value) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{kind}.{name}={value}")?;
        }
        Ok(())
    }
}

/// The tunable parameters of a pipeline, per filter kind. Immutable once
/// built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    groups: Vec<(FilterKind, Vec<ParameterSpec>)>,
}

impl ParameterSpace {
    /// Build from explicit groups. Every spec is validated; filter kinds and
    /// parameter names within a filter must be unique.
    pub fn new(groups: Vec<(FilterKind, Vec<ParameterSpec>)>) -> Result<Self> {
        for (i, (kind, specs)) in groups.iter().enumerate() {
            if groups[..i].iter().any(|(k, _)| k == kind) {
                return Err(NoiseError::invalid_config(format!(
                    "filter '{kind}' appears more than once"
                )));
            }
            for (j, spec) in specs.iter().enumerate() {
                spec.validate()?;
                if specs[..j].iter().any(|s| s.name == spec.name) {
                    return Err(NoiseError::invalid_config(format!(
                        "parameter '{kind}.{}' declared twice",
                        spec.name
                    )));
                }
            }
        }
        Ok(Self { groups })
    }

    /// Built-in spaces of `kinds`, in order.
    pub fn for_filters(kinds: &[FilterKind]) -> Result<Self> {
        Self::new(kinds.iter().map(|&k| (k, k.default_specs())).collect())
    }

    pub fn kinds(&self) -> impl Iterator<Item = FilterKind> + '_ {
        self.groups.iter().map(|(k, _)| *k)
    }

    pub fn specs(&self, kind: FilterKind) -> Option<&[ParameterSpec]> {
        self.groups
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s.as_slice())
    }

    /// Every parameter in search order.
    pub fn dimensions(&self) -> impl Iterator<Item = (FilterKind, &ParameterSpec)> + '_ {
        self.groups
            .iter()
            .flat_map(|(k, specs)| specs.iter().map(move |s| (*k, s)))
    }

    /// Number of tunable parameters.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, s)| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat vector of `params` in dimension order.
    pub fn flatten(&self, params: &ParamSet) -> Result<Vec<f64>> {
        self.dimensions()
            .map(|(kind, spec)| params.require(kind, &spec.name))
            .collect()
    }

    /// Inverse of [`flatten`](Self::flatten).
    pub fn unflatten(&self, values: &[f64]) -> ParamSet {
        let mut set = ParamSet::new();
        for ((kind, spec), &v) in self.dimensions().zip(values) {
            set.set(kind, spec.name.clone(), v);
        }
        set
    }

    /// Snap every coordinate of a flat vector.
    pub fn snap(&self, values: &[f64]) -> Vec<f64> {
        self.dimensions()
            .zip(values)
            .map(|((_, spec), &v)| spec.snap(v))
            .collect()
    }

    /// Check every coordinate of a flat vector.
    pub fn check(&self, values: &[f64]) -> Result<()> {
        for ((kind, spec), &v) in self.dimensions().zip(values) {
            spec.check(kind.name(), v)?;
        }
        Ok(())
    }

    /// Check every parameter of `params` that this space declares.
    pub fn check_params(&self, params: &ParamSet) -> Result<()> {
        self.check(&self.flatten(params)?)
    }

    /// Default values of every filter, snapped onto this space.
    pub fn default_params(&self) -> ParamSet {
        let mut set = ParamSet::new();
        for (kind, specs) in &self.groups {
            let defaults = kind.default_params();
            for spec in specs {
                let v = defaults.get(&spec.name).copied().unwrap_or(spec.min);
                set.set(*kind, spec.name.clone(), spec.snap(v));
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_spec() -> ParameterSpec {
        ParameterSpec::new("cutoff", ParamKind::Float, 0.1, 0.9, 0.1)
    }

    // ==================== Spec Tests ====================

    #[test]
    fn test_grid_len_tolerates_round_off() {
        assert_eq!(float_spec().grid_len(), 9);
        let odd = ParameterSpec::new("d", ParamKind::OddInteger, 3.0, 15.0, 2.0);
        assert_eq!(odd.grid_len(), 7);
        // max not on grid: last legal value is 0.19
        let notch = ParameterSpec::new("bw", ParamKind::Float, 0.01, 0.2, 0.02);
        assert_eq!(notch.grid_len(), 10);
        assert!((notch.snap(0.2) - 0.19).abs() < 1e-12);
    }

    #[test]
    fn test_snap_clamps_and_rounds() {
        let spec = float_spec();
        assert!((spec.snap(0.34) - 0.3).abs() < 1e-12);
        assert!((spec.snap(-5.0) - 0.1).abs() < 1e-12);
        assert!((spec.snap(5.0) - 0.9).abs() < 1e-12);
        assert!((spec.snap(f64::NAN) - 0.1).abs() < 1e-12);

        let odd = ParameterSpec::new("d", ParamKind::OddInteger, 3.0, 15.0, 2.0);
        assert_eq!(odd.snap(8.0), 9.0);
        assert_eq!(odd.snap(6.9), 7.0);
        assert_eq!(odd.snap(100.0), 15.0);
    }

    #[test]
    fn test_snapped_values_are_contained() {
        for spec in FilterKind::ALL.iter().flat_map(|k| k.default_specs()) {
            for i in 0..50 {
                let v = spec.min - 1.0 + i as f64 * (spec.range() + 2.0) / 49.0;
                let s = spec.snap(v);
                assert!(spec.contains(s), "{} snapped {v} -> {s}", spec.name);
            }
        }
    }

    #[test]
    fn test_check_reports_out_of_range() {
        let spec = float_spec();
        assert!(spec.check("fourier", 0.5).is_ok());
        match spec.check("fourier", 0.95) {
            Err(NoiseError::ParameterOutOfRange { filter, name, .. }) => {
                assert_eq!(filter, "fourier");
                assert_eq!(name, "cutoff");
            }
            other => panic!("unexpected {other:?}"),
        }
        // Off grid
        assert!(spec.check("fourier", 0.55).is_err());

        let odd = ParameterSpec::new("d", ParamKind::OddInteger, 3.0, 15.0, 2.0);
        assert!(odd.check("bilateral", 8.0).is_err());
    }

    #[test]
    fn test_spec_validation() {
        assert!(float_spec().validate().is_ok());
        assert!(ParameterSpec::new("x", ParamKind::Float, 1.0, 0.0, 0.1)
            .validate()
            .is_err());
        assert!(ParameterSpec::new("x", ParamKind::Float, 0.0, 1.0, 0.0)
            .validate()
            .is_err());
        assert!(ParameterSpec::new("x", ParamKind::Integer, 0.0, 1.5, 1.0)
            .validate()
            .is_err());
        assert!(ParameterSpec::new("x", ParamKind::OddInteger, 2.0, 10.0, 2.0)
            .validate()
            .is_err());
        assert!(ParameterSpec::new("", ParamKind::Float, 0.0, 1.0, 0.1)
            .validate()
            .is_err());
    }

    // ==================== Space Tests ====================

    #[test]
    fn test_builtin_spaces_are_valid() {
        let space = ParameterSpace::for_filters(&FilterKind::ALL).unwrap();
        assert_eq!(space.len(), 18);
        let defaults = space.default_params();
        assert!(space.check_params(&defaults).is_ok());
        // 75 is off the 10-step grid
        assert_eq!(defaults.get(FilterKind::Bilateral, "sigma_color"), Some(80.0));
        // 0.0 is below the tuning bounds
        assert!((defaults.get(FilterKind::Wavelet, "sigma").unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_filters_rejected() {
        let err = ParameterSpace::for_filters(&[FilterKind::Notch, FilterKind::Notch]);
        assert!(matches!(err, Err(NoiseError::InvalidConfig(_))));
    }

    #[test]
    fn test_flatten_roundtrip_and_missing() {
        let space = ParameterSpace::for_filters(&[FilterKind::LineWise, FilterKind::Wavelet]).unwrap();
        let params = ParamSet::new()
            .with(FilterKind::LineWise, "window_size", 7.0)
            .with(FilterKind::LineWise, "strength", 0.5)
            .with(FilterKind::Wavelet, "sigma", 0.3);
        let flat = space.flatten(&params).unwrap();
        assert_eq!(flat, vec![7.0, 0.5, 0.3]);
        assert_eq!(space.unflatten(&flat), params);

        let missing = ParamSet::new().with(FilterKind::LineWise, "window_size", 7.0);
        assert!(matches!(
            space.flatten(&missing),
            Err(NoiseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_param_set_display() {
        let params = ParamSet::new()
            .with(FilterKind::Notch, "num_notches", 2.0)
            .with(FilterKind::Bilateral, "d", 5.0);
        assert_eq!(params.to_string(), "bilateral.d=5, notch.num_notches=2");
    }
}
