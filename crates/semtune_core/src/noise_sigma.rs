//! Noise sigma estimators.
//!
//! The simple estimate is the std of the high-pass residual left after a
//! Gaussian blur. The MAD variant applies `1.4826 * MAD` to that residual and
//! tolerates outliers better. The Laplacian estimate is the std of the
//! discrete Laplacian response and is only meaningful relative to itself.
//! A background search picks the most uniform block of the frame.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::float_trait::NoiseFloat;
use crate::image::{prepare, samples, Roi};
use crate::smoothing::{high_pass_residual, laplacian};
use crate::stats::{mad, std_dev, MAD_TO_SIGMA};

/// Largest block edge tried by [`estimate_background_roi`].
const BACKGROUND_BLOCK_MAX: usize = 32;
/// Below this block edge the whole image is returned.
const BACKGROUND_BLOCK_MIN: usize = 8;

/// Gaussian width (pixels) used to split signal from the noise residual.
pub const DEFAULT_RESIDUAL_SIGMA: f64 = 1.0;

/// The three noise standard deviation estimates, in input intensity units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseSigmas {
    /// Standard deviation of the high-pass residual.
    pub simple: f64,
    /// 1.4826 * MAD of the high-pass residual.
    pub mad: f64,
    /// Standard deviation of the Laplacian response.
    pub laplacian: f64,
}

pub(crate) fn sigma_simple_impl(residual: ArrayView2<f64>) -> f64 {
    std_dev(&samples(residual))
}

/// MAD-based sigma of a residual.
///
/// The MAD is taken around the residual median, so a constant offset left in
/// the residual does not bias the estimate.
pub(crate) fn sigma_mad_impl(residual: ArrayView2<f64>) -> f64 {
    MAD_TO_SIGMA * mad(&samples(residual))
}

pub(crate) fn sigma_laplacian_impl(image: ArrayView2<f64>) -> f64 {
    std_dev(&samples(laplacian(image).view()))
}

/// All three estimates from an image and its precomputed high-pass residual.
pub(crate) fn noise_sigmas_impl(image: ArrayView2<f64>, residual: ArrayView2<f64>) -> NoiseSigmas {
    NoiseSigmas {
        simple: sigma_simple_impl(residual),
        mad: sigma_mad_impl(residual),
        laplacian: sigma_laplacian_impl(image),
    }
}

/// Estimate noise sigma as the standard deviation of `image - G_sigma * image`.
pub fn noise_sigma_simple<F: NoiseFloat>(image: ArrayView2<F>, smoothing_sigma: f64) -> Result<f64> {
    let img = prepare(image)?;
    let residual = high_pass_residual(img.view(), smoothing_sigma);
    Ok(sigma_simple_impl(residual.view()))
}

/// Robust noise sigma: 1.4826 * MAD of the high-pass residual.
///
/// Insensitive to sparse outliers such as hot pixels or isolated defects.
pub fn noise_sigma_mad<F: NoiseFloat>(image: ArrayView2<F>, smoothing_sigma: f64) -> Result<f64> {
    let img = prepare(image)?;
    let residual = high_pass_residual(img.view(), smoothing_sigma);
    Ok(sigma_mad_impl(residual.view()))
}

/// Noise sigma from the discrete Laplacian response.
///
/// Not normalized to the kernel gain: for white noise of standard deviation
/// `s` the result is about `sqrt(20) * s`. Use it for relative comparisons.
pub fn noise_sigma_laplacian<F: NoiseFloat>(image: ArrayView2<F>) -> Result<f64> {
    let img = prepare(image)?;
    Ok(sigma_laplacian_impl(img.view()))
}

/// Compute every sigma estimate sharing one residual.
pub fn estimate_noise_sigmas<F: NoiseFloat>(
    image: ArrayView2<F>,
    smoothing_sigma: f64,
) -> Result<NoiseSigmas> {
    let img = prepare(image)?;
    let residual = high_pass_residual(img.view(), smoothing_sigma);
    Ok(noise_sigmas_impl(img.view(), residual.view()))
}

/// Find the most uniform square block, for use as a background region.
///
/// The block edge is `min(32, rows / 4, cols / 4)`; windows slide by half a
/// block and the one with the lowest standard deviation wins (first on ties).
/// Images too small for an 8-pixel block yield the full frame.
pub fn estimate_background_roi<F: NoiseFloat>(image: ArrayView2<F>) -> Result<Roi> {
    let img = prepare(image)?;
    let (rows, cols) = img.dim();
    let block = BACKGROUND_BLOCK_MAX.min(rows / 4).min(cols / 4);
    if block < BACKGROUND_BLOCK_MIN {
        return Ok(Roi::new(0, 0, cols, rows));
    }

    let step = block / 2;
    let mut best = Roi::new(0, 0, block, block);
    let mut best_std = f64::INFINITY;
    for y in (0..=rows - block).step_by(step) {
        for x in (0..=cols - block).step_by(step) {
            let roi = Roi::new(x, y, block, block);
            let window = roi.crop(img.view())?;
            let sd = std_dev(&samples(window));
            if sd < best_std {
                best_std = sd;
                best = roi;
            }
        }
    }
    Ok(best)
}
