//! Signal-to-noise ratio estimates.
//!
//! - **mean/std**: global mean over global standard deviation.
//! - **RMS**: signal RMS over the RMS of a noise residual. The residual is
//!   `image - reference` when a reference is available, otherwise the
//!   high-pass residual of the image itself (see [`crate::smoothing`]).
//!
//! A zero denominator yields [`SNR_SENTINEL`]; every value is clamped to
//! `[-SNR_SENTINEL, SNR_SENTINEL]` so reports stay finite.

use ndarray::{Array2, ArrayView2};

use crate::error::Result;
use crate::float_trait::NoiseFloat;
use crate::image::{prepare, samples, validate_pair, to_f64};
use crate::smoothing::high_pass_residual;
use crate::stats::{mean, rms, std_dev};

/// Value reported when the noise term vanishes.
pub const SNR_SENTINEL: f64 = 1.0e6;

/// `num / den`, mapped to the sentinel when `den` is zero and clamped.
fn ratio_or_sentinel(num: f64, den: f64) -> f64 {
    if den <= 0.0 {
        return SNR_SENTINEL;
    }
    let ratio = num / den;
    if ratio.is_finite() {
        ratio.clamp(-SNR_SENTINEL, SNR_SENTINEL)
    } else {
        SNR_SENTINEL
    }
}

pub(crate) fn snr_mean_std_impl(image: ArrayView2<f64>) -> f64 {
    let data = samples(image);
    ratio_or_sentinel(mean(&data), std_dev(&data))
}

/// Single-image RMS SNR against a precomputed high-pass residual.
pub(crate) fn snr_rms_residual_impl(image: ArrayView2<f64>, residual: ArrayView2<f64>) -> f64 {
    let signal = rms(&samples(image));
    let noise = rms(&samples(residual));
    ratio_or_sentinel(signal, noise)
}

/// Paired RMS SNR: the residual is `image - reference`.
pub(crate) fn snr_rms_paired_impl(image: ArrayView2<f64>, reference: ArrayView2<f64>) -> f64 {
    let diff = &image - &reference;
    snr_rms_residual_impl(image, diff.view())
}

/// SNR as mean / standard deviation.
pub fn snr_mean_std<F: NoiseFloat>(image: ArrayView2<F>) -> Result<f64> {
    let img = prepare(image)?;
    Ok(snr_mean_std_impl(img.view()))
}

/// SNR as RMS over the RMS of the high-pass residual (no reference).
pub fn snr_rms<F: NoiseFloat>(image: ArrayView2<F>, smoothing_sigma: f64) -> Result<f64> {
    let img = prepare(image)?;
    let residual = high_pass_residual(img.view(), smoothing_sigma);
    Ok(snr_rms_residual_impl(img.view(), residual.view()))
}

/// SNR as RMS over the RMS of `processed - original`.
pub fn snr_rms_paired<F: NoiseFloat>(
    processed: ArrayView2<F>,
    original: ArrayView2<F>,
) -> Result<f64> {
    validate_pair(processed, original)?;
    Ok(snr_rms_paired_impl(
        to_f64(processed).view(),
        to_f64(original).view(),
    ))
}

/// Block-wise mean/std SNR map.
///
/// Each output cell covers one `block x block` tile; partial tiles at the
/// right and bottom edges are ignored. Uniform tiles map to the sentinel.
pub fn local_snr_map<F: NoiseFloat>(image: ArrayView2<F>, block: usize) -> Result<Array2<f64>> {
    let img = prepare(image)?;
    if block == 0 {
        return Err(crate::error::NoiseError::invalid_config(
            "local SNR block size must be > 0",
        ));
    }
    let (rows, cols) = img.dim();
    let (br, bc) = (rows / block, cols / block);

    Ok(Array2::from_shape_fn((br, bc), |(i, j)| {
        let tile = img.slice(ndarray::s![
            i * block..(i + 1) * block,
            j * block..(j + 1) * block
        ]);
        snr_mean_std_impl(tile)
    }))
}
