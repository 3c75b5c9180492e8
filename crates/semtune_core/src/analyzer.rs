//! Noise analyzer: runs every metric primitive and aggregates the results.
//!
//! # Reference modes
//!
//! Two metrics are naturally defined against a reference image: the RMS SNR
//! (residual = processed - original) and the edge coherence (edge-location
//! preservation). Without a reference they use single-image proxies:
//!
//! | metric | `Paired` | `SingleImage` |
//! |---|---|---|
//! | `SnrRms` | RMS over RMS of `image - reference` | RMS over RMS of the high-pass residual |
//! | `EdgeCoherence` | fraction of edge pixels near a reference edge | mean block-wise orientation coherence |
//!
//! Every [`NoiseReport`] records which mode produced it.
//!
//! [`NoiseAnalyzer::compare`] gets a noisy original, not a clean reference.
//! Its before report is always single-image. With `paired_compare` the after
//! report switches only `EdgeCoherence` to the paired form; `SnrRms` keeps
//! the single-image proxy on both sides.
//!
//! # Example
//!
//! ```ignore
//! use semtune_core::{NoiseAnalyzer, Metric};
//!
//! let analyzer = NoiseAnalyzer::default();
//! let cmp = analyzer.compare(original.view(), denoised.view())?;
//! println!("{}", cmp.after);
//! println!("SNR change: {:+.1}%", cmp.delta.get(Metric::Snr));
//! ```

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::edge::{
    edge_coherence_paired_impl, edge_stats_impl, orientation_coherence_impl,
    DEFAULT_COHERENCE_BLOCK,
};
use crate::error::{NoiseError, Result};
use crate::float_trait::NoiseFloat;
use crate::image::{prepare, to_f64, validate_pair, Roi};
use crate::linewise::{line_stats_impl, DEFAULT_ABNORMAL_LINE_FACTOR};
use crate::noise_sigma::{noise_sigmas_impl, DEFAULT_RESIDUAL_SIGMA};
use crate::psd::{spectral_stats_impl, DEFAULT_PSD_PEAK_FACTOR};
use crate::smoothing::high_pass_residual;
use crate::snr::{snr_mean_std_impl, snr_rms_paired_impl, snr_rms_residual_impl};
use crate::stats::finite_or;

// =============================================================================
// Metrics
// =============================================================================

/// Number of metrics in a report.
pub const METRIC_COUNT: usize = 15;

/// `|before|` below this is treated as zero when computing relative changes.
const NEAR_ZERO: f64 = 1e-10;

/// The metric families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricFamily {
    Snr,
    NoiseSigma,
    LineWise,
    Edge,
    Spectral,
}

/// One named metric of a [`NoiseReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Snr,
    SnrRms,
    NoiseSigma,
    NoiseSigmaMad,
    NoiseSigmaLaplacian,
    LineSigmaH,
    LineSigmaV,
    LineCorrelation,
    AbnormalLines,
    EdgeNoise,
    GradientVariance,
    EdgeSharpness,
    EdgeCoherence,
    SpectralEnergy,
    PsdPeaks,
}

impl Metric {
    /// All metrics in report order.
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::Snr,
        Metric::SnrRms,
        Metric::NoiseSigma,
        Metric::NoiseSigmaMad,
        Metric::NoiseSigmaLaplacian,
        Metric::LineSigmaH,
        Metric::LineSigmaV,
        Metric::LineCorrelation,
        Metric::AbnormalLines,
        Metric::EdgeNoise,
        Metric::GradientVariance,
        Metric::EdgeSharpness,
        Metric::EdgeCoherence,
        Metric::SpectralEnergy,
        Metric::PsdPeaks,
    ];

    /// Position in report order.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable snake_case identifier.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Snr => "snr",
            Metric::SnrRms => "snr_rms",
            Metric::NoiseSigma => "noise_sigma",
            Metric::NoiseSigmaMad => "noise_sigma_mad",
            Metric::NoiseSigmaLaplacian => "noise_sigma_laplacian",
            Metric::LineSigmaH => "line_sigma_h",
            Metric::LineSigmaV => "line_sigma_v",
            Metric::LineCorrelation => "line_correlation",
            Metric::AbnormalLines => "abnormal_lines",
            Metric::EdgeNoise => "edge_noise",
            Metric::GradientVariance => "gradient_variance",
            Metric::EdgeSharpness => "edge_sharpness",
            Metric::EdgeCoherence => "edge_coherence",
            Metric::SpectralEnergy => "spectral_energy",
            Metric::PsdPeaks => "psd_peaks",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Snr => "SNR (mean/std)",
            Metric::SnrRms => "SNR (RMS)",
            Metric::NoiseSigma => "Noise sigma (std)",
            Metric::NoiseSigmaMad => "Noise sigma (MAD)",
            Metric::NoiseSigmaLaplacian => "Noise sigma (Laplacian)",
            Metric::LineSigmaH => "Line sigma (H)",
            Metric::LineSigmaV => "Line sigma (V)",
            Metric::LineCorrelation => "Line correlation",
            Metric::AbnormalLines => "Abnormal lines",
            Metric::EdgeNoise => "Edge noise",
            Metric::GradientVariance => "Gradient variance",
            Metric::EdgeSharpness => "Edge sharpness",
            Metric::EdgeCoherence => "Edge coherence",
            Metric::SpectralEnergy => "Spectral energy",
            Metric::PsdPeaks => "PSD peaks",
        }
    }

    /// Whether a larger value means a better image.
    pub fn higher_is_better(self) -> bool {
        matches!(
            self,
            Metric::Snr
                | Metric::SnrRms
                | Metric::LineCorrelation
                | Metric::EdgeSharpness
                | Metric::EdgeCoherence
        )
    }

    pub fn family(self) -> MetricFamily {
        match self {
            Metric::Snr | Metric::SnrRms => MetricFamily::Snr,
            Metric::NoiseSigma | Metric::NoiseSigmaMad | Metric::NoiseSigmaLaplacian => {
                MetricFamily::NoiseSigma
            }
            Metric::LineSigmaH
            | Metric::LineSigmaV
            | Metric::LineCorrelation
            | Metric::AbnormalLines => MetricFamily::LineWise,
            Metric::EdgeNoise
            | Metric::GradientVariance
            | Metric::EdgeSharpness
            | Metric::EdgeCoherence => MetricFamily::Edge,
            Metric::SpectralEnergy | Metric::PsdPeaks => MetricFamily::Spectral,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = NoiseError;

    fn from_str(s: &str) -> Result<Self> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| NoiseError::invalid_input(format!("unknown metric '{s}'")))
    }
}

// =============================================================================
// Reports
// =============================================================================

/// How the reference-dependent metrics of a report were computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceMode {
    /// Single-image proxies (no reference available).
    SingleImage,
    /// Computed against a reference image.
    Paired,
}

/// All 15 metrics of one image. Every field is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseReport {
    pub mode: ReferenceMode,
    pub snr: f64,
    pub snr_rms: f64,
    pub noise_sigma: f64,
    pub noise_sigma_mad: f64,
    pub noise_sigma_laplacian: f64,
    pub line_sigma_h: f64,
    pub line_sigma_v: f64,
    pub line_correlation: f64,
    pub abnormal_lines: usize,
    pub edge_noise: f64,
    pub gradient_variance: f64,
    pub edge_sharpness: f64,
    pub edge_coherence: f64,
    pub spectral_energy: f64,
    pub psd_peaks: usize,
}

impl NoiseReport {
    /// Value of one metric. Counts are returned as f64.
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Snr => self.snr,
            Metric::SnrRms => self.snr_rms,
            Metric::NoiseSigma => self.noise_sigma,
            Metric::NoiseSigmaMad => self.noise_sigma_mad,
            Metric::NoiseSigmaLaplacian => self.noise_sigma_laplacian,
            Metric::LineSigmaH => self.line_sigma_h,
            Metric::LineSigmaV => self.line_sigma_v,
            Metric::LineCorrelation => self.line_correlation,
            Metric::AbnormalLines => self.abnormal_lines as f64,
            Metric::EdgeNoise => self.edge_noise,
            Metric::GradientVariance => self.gradient_variance,
            Metric::EdgeSharpness => self.edge_sharpness,
            Metric::EdgeCoherence => self.edge_coherence,
            Metric::SpectralEnergy => self.spectral_energy,
            Metric::PsdPeaks => self.psd_peaks as f64,
        }
    }

    /// All values in report order.
    pub fn values(&self) -> [f64; METRIC_COUNT] {
        Metric::ALL.map(|m| self.get(m))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.iter().map(move |&m| (m, self.get(m)))
    }
}

impl fmt::Display for NoiseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            ReferenceMode::SingleImage => "single image",
            ReferenceMode::Paired => "paired",
        };
        writeln!(f, "=== Noise Report ({mode}) ===")?;
        writeln!(f, "  SNR (mean/std): {:.2}", self.snr)?;
        writeln!(f, "  SNR (RMS): {:.2}", self.snr_rms)?;
        writeln!(f, "  Noise sigma (std): {:.4}", self.noise_sigma)?;
        writeln!(f, "  Noise sigma (MAD): {:.4}", self.noise_sigma_mad)?;
        writeln!(f, "  Noise sigma (Laplacian): {:.4}", self.noise_sigma_laplacian)?;
        writeln!(
            f,
            "  Line sigma (H/V): {:.4} / {:.4}",
            self.line_sigma_h, self.line_sigma_v
        )?;
        writeln!(f, "  Line correlation: {:.4}", self.line_correlation)?;
        writeln!(f, "  Abnormal lines: {}", self.abnormal_lines)?;
        writeln!(f, "  Edge noise: {:.4}", self.edge_noise)?;
        writeln!(f, "  Edge sharpness: {:.4}", self.edge_sharpness)?;
        writeln!(f, "  Gradient variance: {:.4}", self.gradient_variance)?;
        writeln!(f, "  Edge coherence: {:.4}", self.edge_coherence)?;
        writeln!(f, "  Spectral energy: {:.3e}", self.spectral_energy)?;
        write!(f, "  PSD peaks: {}", self.psd_peaks)
    }
}

/// Signed relative change per metric, in percent of the before value,
/// oriented so that positive means improvement. A metric whose before value
/// is (near) zero has no relative scale and reports 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    values: [f64; METRIC_COUNT],
}

/// Relative change in the improvement direction.
fn relative_change(before: f64, after: f64, higher_is_better: bool) -> f64 {
    if before.abs() < NEAR_ZERO {
        return 0.0;
    }
    let sign = if higher_is_better { 1.0 } else { -1.0 };
    finite_or(sign * 100.0 * (after - before) / before.abs(), 0.0)
}

impl MetricDelta {
    /// Delta from `before` to `after`.
    pub fn between(before: &NoiseReport, after: &NoiseReport) -> Self {
        Self {
            values: Metric::ALL
                .map(|m| relative_change(before.get(m), after.get(m), m.higher_is_better())),
        }
    }

    /// Build a delta directly, e.g. for what-if scoring.
    pub fn from_fn(mut f: impl FnMut(Metric) -> f64) -> Self {
        Self {
            values: Metric::ALL.map(|m| finite_or(f(m), 0.0)),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.values[metric.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.iter().map(move |&m| (m, self.values[m.index()]))
    }

    /// Metrics that got worse.
    pub fn regressions(&self) -> Vec<Metric> {
        self.iter().filter(|&(_, d)| d < 0.0).map(|(m, _)| m).collect()
    }

    /// The same changes with every sign flipped.
    pub fn negated(&self) -> Self {
        Self {
            values: self.values.map(|v| -v),
        }
    }
}

/// Result of [`NoiseAnalyzer::compare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub before: NoiseReport,
    pub after: NoiseReport,
    pub delta: MetricDelta,
}

// =============================================================================
// Analyzer
// =============================================================================

/// Analyzer tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Gaussian sigma (pixels) separating signal from the noise residual.
    pub smoothing_sigma: f64,
    /// Abnormal-line threshold in units of the robust line-mean spread.
    pub abnormal_line_factor: f64,
    /// Spectral peak threshold in multiples of the median radial energy.
    pub psd_peak_factor: f64,
    /// Tile size for single-image orientation coherence.
    pub coherence_block: usize,
    /// When set, the processed report of [`NoiseAnalyzer::compare`] measures
    /// edge coherence against the original (fraction of processed edges on
    /// original edges) instead of orientation coherence.
    pub paired_compare: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            smoothing_sigma: DEFAULT_RESIDUAL_SIGMA,
            abnormal_line_factor: DEFAULT_ABNORMAL_LINE_FACTOR,
            psd_peak_factor: DEFAULT_PSD_PEAK_FACTOR,
            coherence_block: DEFAULT_COHERENCE_BLOCK,
            paired_compare: false,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(NoiseError::invalid_config(format!(
                    "{name} must be positive and finite, got {v}"
                )))
            }
        };
        positive("smoothing_sigma", self.smoothing_sigma)?;
        positive("abnormal_line_factor", self.abnormal_line_factor)?;
        positive("psd_peak_factor", self.psd_peak_factor)?;
        if self.coherence_block == 0 {
            return Err(NoiseError::invalid_config("coherence_block must be > 0"));
        }
        Ok(())
    }
}

/// Computes [`NoiseReport`]s. Holds only configuration, so one analyzer can
/// be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct NoiseAnalyzer {
    config: AnalyzerConfig,
}

impl NoiseAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one image using single-image proxies.
    pub fn analyze<F: NoiseFloat>(&self, image: ArrayView2<F>) -> Result<NoiseReport> {
        let img = prepare(image)?;
        Ok(self.report_impl(img.view(), None))
    }

    /// Analyze `image` against `reference` (paired metrics).
    pub fn analyze_against<F: NoiseFloat>(
        &self,
        image: ArrayView2<F>,
        reference: ArrayView2<F>,
    ) -> Result<NoiseReport> {
        validate_pair(image, reference)?;
        let img = to_f64(image);
        let reference = to_f64(reference);
        Ok(self.report_impl(img.view(), Some(reference.view())))
    }

    /// Analyze a rectangular region of `image`.
    pub fn analyze_region<F: NoiseFloat>(&self, image: ArrayView2<F>, roi: Roi) -> Result<NoiseReport> {
        self.analyze(roi.crop(image)?)
    }

    /// Analyze `original` and `processed` and compute the delta.
    pub fn compare<F: NoiseFloat>(
        &self,
        original: ArrayView2<F>,
        processed: ArrayView2<F>,
    ) -> Result<Comparison> {
        validate_pair(original, processed)?;
        let original = to_f64(original);
        let processed = to_f64(processed);
        let before = self.baseline_impl(original.view());
        let after = self.candidate_impl(original.view(), processed.view());
        let delta = MetricDelta::between(&before, &after);
        Ok(Comparison {
            before,
            after,
            delta,
        })
    }

    /// The "before" report of a comparison. Always single-image: the
    /// original paired with itself carries no information.
    pub(crate) fn baseline_impl(&self, original: ArrayView2<f64>) -> NoiseReport {
        self.report_impl(original, None)
    }

    /// The "after" report of a comparison.
    ///
    /// With `paired_compare` only edge coherence is measured against the
    /// original. RMS SNR stays single-image because the original is not
    /// noise-free, so a residual against it measures removed noise.
    pub(crate) fn candidate_impl(
        &self,
        original: ArrayView2<f64>,
        processed: ArrayView2<f64>,
    ) -> NoiseReport {
        let mut report = self.report_impl(processed, None);
        if self.config.paired_compare {
            report.mode = ReferenceMode::Paired;
            report.edge_coherence =
                finite_or(edge_coherence_paired_impl(processed, original), 0.0);
        }
        report
    }

    fn report_impl(&self, img: ArrayView2<f64>, reference: Option<ArrayView2<f64>>) -> NoiseReport {
        let cfg = &self.config;
        let residual = high_pass_residual(img, cfg.smoothing_sigma);
        let sigmas = noise_sigmas_impl(img, residual.view());
        let lines = line_stats_impl(img, cfg.abnormal_line_factor);
        let edges = edge_stats_impl(img);
        let spectral = spectral_stats_impl(img, cfg.psd_peak_factor);
        let snr = snr_mean_std_impl(img);

        let (mode, snr_rms, edge_coherence) = match reference {
            Some(reference) => (
                ReferenceMode::Paired,
                snr_rms_paired_impl(img, reference),
                edge_coherence_paired_impl(img, reference),
            ),
            None => (
                ReferenceMode::SingleImage,
                snr_rms_residual_impl(img, residual.view()),
                orientation_coherence_impl(img, cfg.coherence_block),
            ),
        };

        log::trace!(
            "analyzed {}x{} image ({:?}): snr={:.3} sigma={:.4}",
            img.nrows(),
            img.ncols(),
            mode,
            snr,
            sigmas.simple
        );

        NoiseReport {
            mode,
            snr: finite_or(snr, 0.0),
            snr_rms: finite_or(snr_rms, 0.0),
            noise_sigma: finite_or(sigmas.simple, 0.0),
            noise_sigma_mad: finite_or(sigmas.mad, 0.0),
            noise_sigma_laplacian: finite_or(sigmas.laplacian, 0.0),
            line_sigma_h: finite_or(lines.sigma_h, 0.0),
            line_sigma_v: finite_or(lines.sigma_v, 0.0),
            line_correlation: finite_or(lines.correlation, 0.0),
            abnormal_lines: lines.abnormal_count(),
            edge_noise: finite_or(edges.edge_noise, 0.0),
            gradient_variance: finite_or(edges.gradient_variance, 0.0),
            edge_sharpness: finite_or(edges.edge_sharpness, 0.0),
            edge_coherence: finite_or(edge_coherence, 0.0),
            spectral_energy: finite_or(spectral.total_energy, 0.0),
            psd_peaks: spectral.peak_count,
        }
    }
}
