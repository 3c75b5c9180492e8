//! Edge statistics from the Sobel gradient.
//!
//! A pixel is an edge pixel when its gradient magnitude exceeds
//! `mean + std` of the magnitude map; every other pixel is "flat".

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{NoiseError, Result};
use crate::float_trait::NoiseFloat;
use crate::image::{prepare, samples, validate_pair, to_f64};
use crate::smoothing::{gradient_magnitude, sobel};
use crate::stats::{mean, std_dev, variance};

/// Default block edge length for orientation coherence.
pub const DEFAULT_COHERENCE_BLOCK: usize = 16;

/// Gradient-based statistics of one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeStats {
    /// Std of the gradient magnitude over flat pixels.
    pub edge_noise: f64,
    /// Variance of the whole gradient magnitude map.
    pub gradient_variance: f64,
    /// Mean gradient magnitude over edge pixels.
    pub edge_sharpness: f64,
}

/// Boolean edge mask: magnitude strictly above mean + std.
///
/// A uniform magnitude map has no edges.
pub(crate) fn edge_mask(magnitude: ArrayView2<f64>) -> Array2<bool> {
    let data = samples(magnitude);
    let threshold = mean(&data) + std_dev(&data);
    magnitude.mapv(|m| m > threshold)
}

pub(crate) fn edge_stats_impl(image: ArrayView2<f64>) -> EdgeStats {
    let magnitude = gradient_magnitude(image);
    let mask = edge_mask(magnitude.view());

    let mut edges = Vec::new();
    let mut flat = Vec::new();
    for (&m, &is_edge) in magnitude.iter().zip(mask.iter()) {
        if is_edge {
            edges.push(m);
        } else {
            flat.push(m);
        }
    }

    EdgeStats {
        edge_noise: std_dev(&flat),
        gradient_variance: variance(&samples(magnitude.view())),
        edge_sharpness: mean(&edges),
    }
}

/// Mean block-wise orientation coherence in [0, 1].
///
/// Within each `block x block` tile the gradient angles are averaged on the
/// unit circle; the coherence is the length of the mean vector. Tiles that do
/// not fit are skipped; an image smaller than one tile is treated as a single
/// tile. Zero gradients count as angle 0.
pub(crate) fn orientation_coherence_impl(image: ArrayView2<f64>, block: usize) -> f64 {
    let (gx, gy) = sobel(image);
    let (rows, cols) = image.dim();

    let tile_coherence = |r0: usize, r1: usize, c0: usize, c1: usize| {
        let bx = gx.slice(s![r0..r1, c0..c1]);
        let by = gy.slice(s![r0..r1, c0..c1]);
        let mut sum_cos = 0.0;
        let mut sum_sin = 0.0;
        for (&x, &y) in bx.iter().zip(by.iter()) {
            let norm = x.hypot(y);
            if norm > 0.0 {
                sum_cos += x / norm;
                sum_sin += y / norm;
            } else {
                sum_cos += 1.0;
            }
        }
        let n = bx.len() as f64;
        ((sum_cos / n).hypot(sum_sin / n)).min(1.0)
    };

    if block == 0 || rows < block || cols < block {
        return tile_coherence(0, rows, 0, cols);
    }

    let mut values = Vec::with_capacity((rows / block) * (cols / block));
    for r in (0..=rows - block).step_by(block) {
        for c in (0..=cols - block).step_by(block) {
            values.push(tile_coherence(r, r + block, c, c + block));
        }
    }
    mean(&values)
}

/// 3x3 binary dilation.
fn dilate(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let r0 = r.saturating_sub(1);
        let c0 = c.saturating_sub(1);
        let r1 = (r + 2).min(rows);
        let c1 = (c + 2).min(cols);
        mask.slice(s![r0..r1, c0..c1]).iter().any(|&v| v)
    })
}

/// Fraction of processed-image edge pixels within one pixel of an original
/// edge pixel. No processed edges: 1.0 if the original has none either,
/// else 0.0.
pub(crate) fn edge_coherence_paired_impl(
    processed: ArrayView2<f64>,
    original: ArrayView2<f64>,
) -> f64 {
    let proc_mask = edge_mask(gradient_magnitude(processed).view());
    let orig_mask = edge_mask(gradient_magnitude(original).view());

    let proc_count = proc_mask.iter().filter(|&&v| v).count();
    if proc_count == 0 {
        return if orig_mask.iter().any(|&v| v) { 0.0 } else { 1.0 };
    }

    let near_original = dilate(&orig_mask);
    let matched = proc_mask
        .iter()
        .zip(near_original.iter())
        .filter(|&(&p, &o)| p && o)
        .count();
    matched as f64 / proc_count as f64
}

/// Compute edge noise, gradient variance and edge sharpness.
pub fn edge_statistics<F: NoiseFloat>(image: ArrayView2<F>) -> Result<EdgeStats> {
    let img = prepare(image)?;
    Ok(edge_stats_impl(img.view()))
}

/// Single-image edge coherence: mean gradient-orientation coherence.
pub fn orientation_coherence<F: NoiseFloat>(image: ArrayView2<F>, block: usize) -> Result<f64> {
    if block == 0 {
        return Err(NoiseError::invalid_config("coherence block size must be > 0"));
    }
    let img = prepare(image)?;
    Ok(orientation_coherence_impl(img.view(), block))
}

/// Edge-location preservation of `processed` relative to `original`, in [0, 1].
pub fn edge_coherence<F: NoiseFloat>(processed: ArrayView2<F>, original: ArrayView2<F>) -> Result<f64> {
    validate_pair(processed, original)?;
    Ok(edge_coherence_paired_impl(
        to_f64(processed).view(),
        to_f64(original).view(),
    ))
}

/// Ratio of mean gradient magnitude on the original's edge pixels, processed
/// over original, capped at 1.0. Returns 1.0 when the original has no edges.
pub fn edge_preservation_ratio<F: NoiseFloat>(
    processed: ArrayView2<F>,
    original: ArrayView2<F>,
) -> Result<f64> {
    validate_pair(processed, original)?;
    let orig_mag = gradient_magnitude(to_f64(original).view());
    let proc_mag = gradient_magnitude(to_f64(processed).view());
    let mask = edge_mask(orig_mag.view());

    let (mut orig_sum, mut proc_sum) = (0.0, 0.0);
    for ((&o, &p), &is_edge) in orig_mag.iter().zip(proc_mag.iter()).zip(mask.iter()) {
        if is_edge {
            orig_sum += o;
            proc_sum += p;
        }
    }
    if orig_sum <= 0.0 {
        return Ok(1.0);
    }
    Ok((proc_sum / orig_sum).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::prelude::*;
    use rand_distr::{Distribution, Normal};

    fn step_image(rows: usize, cols: usize, edge_col: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(_, c)| if c < edge_col { 10.0 } else { 50.0 })
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let flat = Array2::from_elem((16, 16), 3.0);
        let stats = edge_statistics(flat.view()).unwrap();
        assert_eq!(stats.edge_noise, 0.0);
        assert_eq!(stats.gradient_variance, 0.0);
        assert_eq!(stats.edge_sharpness, 0.0);
    }

    #[test]
    fn test_step_edge_is_sharp_and_flat_is_quiet() {
        let image = step_image(32, 32, 16);
        let stats = edge_statistics(image.view()).unwrap();
        // Sobel across a step of 40 gives 4 * 40 on both sides of the edge
        assert!((stats.edge_sharpness - 160.0).abs() < 1e-9);
        assert_eq!(stats.edge_noise, 0.0);
        assert!(stats.gradient_variance > 0.0);
    }

    #[test]
    fn test_noise_raises_edge_noise() {
        let mut rng = StdRng::seed_from_u64(17);
        let normal = Normal::new(0.0, 2.0).unwrap();
        let clean = step_image(32, 32, 16);
        let noisy = clean.mapv(|v| v + normal.sample(&mut rng));
        let a = edge_statistics(clean.view()).unwrap();
        let b = edge_statistics(noisy.view()).unwrap();
        assert!(b.edge_noise > a.edge_noise);
    }

    #[test]
    fn test_coherence_of_identical_images_is_one() {
        let image = step_image(32, 32, 10);
        assert_eq!(edge_coherence(image.view(), image.view()).unwrap(), 1.0);
    }

    #[test]
    fn test_coherence_tolerates_one_pixel_shift() {
        let original = step_image(32, 32, 10);
        let shifted = step_image(32, 32, 11);
        assert_eq!(edge_coherence(shifted.view(), original.view()).unwrap(), 1.0);

        let far = step_image(32, 32, 20);
        assert_eq!(edge_coherence(far.view(), original.view()).unwrap(), 0.0);
    }

    #[test]
    fn test_coherence_when_edges_vanish() {
        let original = step_image(16, 16, 8);
        let flat = Array2::from_elem((16, 16), 30.0);
        assert_eq!(edge_coherence(flat.view(), original.view()).unwrap(), 0.0);
        assert_eq!(edge_coherence(flat.view(), flat.view()).unwrap(), 1.0);
    }

    #[test]
    fn test_orientation_coherence_range() {
        let ramp = Array2::from_shape_fn((32, 32), |(_, c)| c as f64);
        let ordered = orientation_coherence(ramp.view(), 16).unwrap();
        assert!((ordered - 1.0).abs() < 1e-12);

        let mut rng = StdRng::seed_from_u64(5);
        let noise = Array2::from_shape_fn((64, 64), |_| rng.gen::<f64>());
        let random = orientation_coherence(noise.view(), 16).unwrap();
        assert!(random < 0.5, "random = {random}");

        // Smaller than one block: whole image is one tile
        let small = Array2::from_shape_fn((4, 4), |(r, _)| r as f64);
        assert!(orientation_coherence(small.view(), 16).unwrap() > 0.99);

        assert!(orientation_coherence(ramp.view(), 0).is_err());
    }

    #[test]
    fn test_preservation_ratio() {
        let original = step_image(16, 16, 8);
        let softened = original.mapv(|v| v * 0.5);
        let ratio = edge_preservation_ratio(softened.view(), original.view()).unwrap();
        assert!((ratio - 0.5).abs() < 1e-12);
        assert_eq!(
            edge_preservation_ratio(original.view(), softened.view()).unwrap(),
            1.0
        );
    }
}
