//! Power spectral density statistics.
//!
//! Periodic disturbances (mechanical vibration, mains pickup, scan banding)
//! concentrate energy in a few spatial frequencies. The 2D PSD is
//! `|FFT|^2 / (H * W)` with DC moved to the centre; the radial profile averages
//! it over integer-radius rings so that peaks show up independent of
//! orientation.

use ndarray::{Array2, ArrayView2, Axis};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::float_trait::NoiseFloat;
use crate::image::prepare;
use crate::linewise::LineDirection;
use crate::stats::median;
use crate::transforms::{fft2d, fftshift, Fft2dPlans};

/// Default peak threshold, in multiples of the median radial energy.
pub const DEFAULT_PSD_PEAK_FACTOR: f64 = 3.0;

/// Bins below this fraction of the strongest bin are treated as round-off.
const PSD_ROUNDOFF_FLOOR: f64 = 1e-20;

/// One spectral peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralPeak {
    /// Profile bin (ring radius or 1D frequency index).
    pub bin: usize,
    /// Spatial frequency in cycles per pixel.
    pub frequency: f64,
    pub power: f64,
    /// Power over the median bin power.
    pub relative_power: f64,
}

/// Spectral summary used by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralStats {
    /// Sum of the 2D PSD without the DC bin.
    pub total_energy: f64,
    pub peak_count: usize,
}

/// A one-sided 1D profile with its frequency axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdProfile {
    pub power: Vec<f64>,
    /// Cycles per pixel for each bin.
    pub frequencies: Vec<f64>,
}

/// Centred 2D PSD.
pub(crate) fn psd_2d_impl(image: ArrayView2<f64>) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let plans = Fft2dPlans::new(rows, cols);
    let spectrum = fft2d(image, &plans);
    let norm = (rows * cols) as f64;
    fftshift(&spectrum.mapv(|z| z.norm_sqr() / norm))
}

/// Ring-averaged profile of a centred PSD, radii `0..min(H/2, W/2)`.
pub(crate) fn radial_profile_impl(psd: &Array2<f64>) -> PsdProfile {
    let (rows, cols) = psd.dim();
    let (cy, cx) = (rows / 2, cols / 2);
    let max_r = cy.min(cx);

    let mut sums = vec![0.0; max_r];
    let mut counts = vec![0usize; max_r];
    for ((r, c), &p) in psd.indexed_iter() {
        let dy = r as f64 - cy as f64;
        let dx = c as f64 - cx as f64;
        let ring = dy.hypot(dx) as usize;
        if ring < max_r {
            sums[ring] += p;
            counts[ring] += 1;
        }
    }

    let power = sums
        .iter()
        .zip(counts.iter())
        .map(|(&s, &n)| if n > 0 { s / n as f64 } else { 0.0 })
        .collect();
    let span = (2 * max_r).max(1) as f64;
    let frequencies = (0..max_r).map(|r| r as f64 / span).collect();
    PsdProfile { power, frequencies }
}

/// Local maxima of `profile` (DC bin 0 excluded) above `factor * median`.
///
/// Results are sorted by power, strongest first.
pub fn spectral_peaks(profile: &PsdProfile, factor: f64) -> Vec<SpectralPeak> {
    let power = &profile.power;
    if power.len() < 4 {
        return Vec::new();
    }
    let no_dc = &power[1..];
    let baseline = median(no_dc);
    let threshold = factor * baseline;
    let strongest = power.iter().copied().fold(0.0, f64::max);
    let floor = (PSD_ROUNDOFF_FLOOR * strongest).max(f64::MIN_POSITIVE);

    let mut peaks: Vec<SpectralPeak> = (1..no_dc.len() - 1)
        .filter(|&i| {
            let p = no_dc[i];
            p > threshold && p > floor && p > no_dc[i - 1] && p > no_dc[i + 1]
        })
        .map(|i| SpectralPeak {
            bin: i + 1,
            frequency: profile.frequencies.get(i + 1).copied().unwrap_or(0.0),
            power: no_dc[i],
            relative_power: if baseline > 0.0 { no_dc[i] / baseline } else { 0.0 },
        })
        .collect();

    peaks.sort_by(|a, b| b.power.total_cmp(&a.power).then(a.bin.cmp(&b.bin)));
    peaks
}

pub(crate) fn spectral_stats_impl(image: ArrayView2<f64>, peak_factor: f64) -> SpectralStats {
    let psd = psd_2d_impl(image);
    let (rows, cols) = psd.dim();
    let dc = psd[[rows / 2, cols / 2]];
    let total_energy = (psd.sum() - dc).max(0.0);
    let profile = radial_profile_impl(&psd);

    SpectralStats {
        total_energy,
        peak_count: spectral_peaks(&profile, peak_factor).len(),
    }
}

/// Centred 2D power spectral density `|FFT|^2 / (H * W)`.
pub fn power_spectrum<F: NoiseFloat>(image: ArrayView2<F>) -> Result<Array2<f64>> {
    let img = prepare(image)?;
    Ok(psd_2d_impl(img.view()))
}

/// Azimuthally averaged PSD.
pub fn radial_psd<F: NoiseFloat>(image: ArrayView2<F>) -> Result<PsdProfile> {
    let img = prepare(image)?;
    Ok(radial_profile_impl(&psd_2d_impl(img.view())))
}

/// One-sided 1D PSD along rows (`Horizontal`) or columns (`Vertical`),
/// averaged over the other axis and normalized by the line length.
pub fn directional_psd<F: NoiseFloat>(
    image: ArrayView2<F>,
    direction: LineDirection,
) -> Result<PsdProfile> {
    let img = prepare(image)?;
    let axis = match direction {
        LineDirection::Horizontal => Axis(1),
        LineDirection::Vertical => Axis(0),
    };
    let n = img.len_of(axis);
    let lanes = img.len_of(Axis(1 - axis.index()));

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer = vec![Complex::new(0.0, 0.0); n];
    let mut accum = vec![0.0; n];

    for lane in img.lanes(axis) {
        for (dst, &v) in buffer.iter_mut().zip(lane.iter()) {
            *dst = Complex::new(v, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, z) in accum.iter_mut().zip(buffer.iter()) {
            *acc += z.norm_sqr();
        }
    }

    let scale = 1.0 / (lanes as f64 * n as f64);
    let half = n / 2;
    Ok(PsdProfile {
        power: accum[..half].iter().map(|p| p * scale).collect(),
        frequencies: (0..half).map(|k| k as f64 / n as f64).collect(),
    })
}

/// Sum of a profile's power over `min_freq <= f <= max_freq`.
pub fn band_energy(profile: &PsdProfile, min_freq: f64, max_freq: f64) -> f64 {
    profile
        .power
        .iter()
        .zip(profile.frequencies.iter())
        .filter(|&(_, &f)| f >= min_freq && f <= max_freq)
        .map(|(p, _)| p)
        .sum()
}

/// Total spectral energy and radial peak count.
pub fn spectral_statistics<F: NoiseFloat>(
    image: ArrayView2<F>,
    peak_factor: f64,
) -> Result<SpectralStats> {
    let img = prepare(image)?;
    Ok(spectral_stats_impl(img.view(), peak_factor))
}
