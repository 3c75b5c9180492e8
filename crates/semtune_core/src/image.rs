//! Input validation and conversion shared by every metric primitive.
//!
//! Images are grayscale `rows x cols` arrays of intensity samples in any
//! consistent scale (normalized or raw 8/16-bit counts). They are read through
//! views and converted to f64 once per analysis.

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{NoiseError, Result};
use crate::float_trait::NoiseFloat;

/// Rectangular region of interest in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Left column.
    pub x: usize,
    /// Top row.
    pub y: usize,
    /// Width in columns.
    pub width: usize,
    /// Height in rows.
    pub height: usize,
}

impl Roi {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Borrow the region out of `image`, failing if it does not fit.
    pub fn crop<'a, F>(&self, image: ArrayView2<'a, F>) -> Result<ArrayView2<'a, F>> {
        let (rows, cols) = image.dim();
        let fits = self.y.checked_add(self.height).is_some_and(|end| end <= rows)
            && self.x.checked_add(self.width).is_some_and(|end| end <= cols);
        if !fits {
            return Err(NoiseError::invalid_input(format!(
                "roi {}x{} at ({}, {}) exceeds image {}x{}",
                self.width, self.height, self.x, self.y, cols, rows
            )));
        }
        Ok(image.slice_move(s![self.y..self.y + self.height, self.x..self.x + self.width]))
    }
}

/// Reject images the metrics cannot describe: fewer than two pixels or any
/// non-finite sample.
pub fn validate_image<F: NoiseFloat>(image: ArrayView2<F>) -> Result<()> {
    let (rows, cols) = image.dim();
    if rows * cols < 2 {
        return Err(NoiseError::invalid_input(format!(
            "image of {rows}x{cols} has fewer than 2 pixels"
        )));
    }
    if let Some(((r, c), _)) = image.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(NoiseError::invalid_input(format!(
            "non-finite sample at ({r}, {c})"
        )));
    }
    Ok(())
}

/// Validate an (image, reference) pair: both valid and equally shaped.
pub fn validate_pair<F: NoiseFloat>(image: ArrayView2<F>, reference: ArrayView2<F>) -> Result<()> {
    validate_image(image)?;
    validate_image(reference)?;
    if image.dim() != reference.dim() {
        return Err(NoiseError::invalid_input(format!(
            "shape mismatch: image {:?} vs reference {:?}",
            image.dim(),
            reference.dim()
        )));
    }
    Ok(())
}

/// Widen samples to f64.
pub fn to_f64<F: NoiseFloat>(image: ArrayView2<F>) -> Array2<f64> {
    image.mapv(|v| v.as_f64())
}

/// Validate and widen in one step.
pub(crate) fn prepare<F: NoiseFloat>(image: ArrayView2<F>) -> Result<Array2<f64>> {
    validate_image(image)?;
    Ok(to_f64(image))
}

/// Flatten into a contiguous sample vector (row-major).
pub(crate) fn samples(image: ArrayView2<f64>) -> Vec<f64> {
    image.iter().copied().collect()
}
