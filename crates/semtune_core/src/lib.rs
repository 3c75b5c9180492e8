//! Noise quantification and filter auto-tuning core.
//!
//! Pure Rust library for measuring noise in grayscale microscope frames and
//! tuning denoising filter parameters against those measurements. Filters
//! themselves are supplied by the host through [`FilterCapability`]; this
//! crate only analyzes, scores and searches.

pub mod analyzer;
pub mod edge;
pub mod error;
pub mod filter;
pub mod float_trait;
pub mod grid_search;
pub mod hill_climbing;
pub mod image;
pub mod linewise;
pub mod noise_sigma;
pub mod optimizer;
pub mod params;
pub mod psd;
pub mod score;
pub mod smoothing;
pub mod snr;
pub mod stats;
pub mod transforms;

// Re-export commonly used types at the crate root
pub use analyzer::{
    AnalyzerConfig, Comparison, Metric, MetricDelta, MetricFamily, NoiseAnalyzer, NoiseReport,
    ReferenceMode,
};
pub use edge::{edge_coherence, edge_statistics, orientation_coherence, EdgeStats};
pub use error::{NoiseError, Result};
pub use filter::{FilterBackend, FilterCapability, Pipeline};
pub use float_trait::NoiseFloat;
pub use grid_search::{GridSearch, GridSearchConfig};
pub use hill_climbing::{HillClimbing, HillClimbingConfig};
pub use image::Roi;
pub use linewise::{line_statistics, LineDirection, LineStats};
pub use noise_sigma::{estimate_background_roi, estimate_noise_sigmas, NoiseSigmas};
pub use optimizer::{OptimizationResult, Optimizer, TraceSample};
pub use params::{FilterKind, FilterParams, ParamKind, ParamSet, ParameterSpace, ParameterSpec};
pub use psd::{radial_psd, spectral_peaks, PsdProfile, SpectralPeak};
pub use score::{score, ScoreBreakdown, ScoreConfig, ScoreFunction};
pub use snr::{snr_mean_std, snr_rms};
