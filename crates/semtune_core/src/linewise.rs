//! Line-wise statistics for scan-line artifacts.
//!
//! Raster microscopes acquire images row by row, so gain or offset drift shows
//! up as whole rows (or columns) that sit above or below their neighbours.
//! These metrics look at the per-line mean profiles:
//!
//! - horizontal sigma: spread of the row means,
//! - vertical sigma: spread of the column means,
//! - line correlation: lag-1 autocorrelation of the row-mean sequence,
//! - abnormal lines: rows and columns whose mean is an outlier.

use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::float_trait::NoiseFloat;
use crate::image::prepare;
use crate::stats::{median, pearson, robust_sigma, std_dev};

/// Default outlier threshold, in units of the line-mean spread.
pub const DEFAULT_ABNORMAL_LINE_FACTOR: f64 = 2.0;

/// Which family of lines a profile runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineDirection {
    /// One value per row.
    Horizontal,
    /// One value per column.
    Vertical,
}

/// Line-wise statistics of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStats {
    pub sigma_h: f64,
    pub sigma_v: f64,
    pub correlation: f64,
    /// Indices of outlier rows.
    pub abnormal_rows: Vec<usize>,
    /// Indices of outlier columns.
    pub abnormal_cols: Vec<usize>,
}

impl LineStats {
    /// Total number of abnormal rows and columns.
    pub fn abnormal_count(&self) -> usize {
        self.abnormal_rows.len() + self.abnormal_cols.len()
    }
}

pub(crate) fn line_means(image: ArrayView2<f64>, direction: LineDirection) -> Vec<f64> {
    // Row means average across columns (axis 1)
    let axis = match direction {
        LineDirection::Horizontal => Axis(1),
        LineDirection::Vertical => Axis(0),
    };
    image
        .mean_axis(axis)
        .map(|m| m.to_vec())
        .unwrap_or_default()
}

/// Indices whose value deviates from the median by more than
/// `factor * robust_sigma`. Empty when the profile has no spread.
pub fn abnormal_lines(means: &[f64], factor: f64) -> Vec<usize> {
    if means.len() < 2 {
        return Vec::new();
    }
    let center = median(means);
    let spread = robust_sigma(means);
    if spread <= f64::EPSILON * center.abs().max(1.0) {
        return Vec::new();
    }
    let limit = factor * spread;
    means
        .iter()
        .enumerate()
        .filter(|&(_, &m)| (m - center).abs() > limit)
        .map(|(i, _)| i)
        .collect()
}

pub(crate) fn line_stats_impl(image: ArrayView2<f64>, factor: f64) -> LineStats {
    let rows = line_means(image, LineDirection::Horizontal);
    let cols = line_means(image, LineDirection::Vertical);

    let correlation = if rows.len() > 2 {
        pearson(&rows[..rows.len() - 1], &rows[1..])
    } else {
        0.0
    };

    LineStats {
        sigma_h: std_dev(&rows),
        sigma_v: std_dev(&cols),
        correlation,
        abnormal_rows: abnormal_lines(&rows, factor),
        abnormal_cols: abnormal_lines(&cols, factor),
    }
}

/// Mean intensity of every row (`Horizontal`) or column (`Vertical`).
pub fn line_profile<F: NoiseFloat>(
    image: ArrayView2<F>,
    direction: LineDirection,
) -> Result<Vec<f64>> {
    let img = prepare(image)?;
    Ok(line_means(img.view(), direction))
}

/// Compute all line-wise statistics.
pub fn line_statistics<F: NoiseFloat>(
    image: ArrayView2<F>,
    abnormal_line_factor: f64,
) -> Result<LineStats> {
    let img = prepare(image)?;
    Ok(line_stats_impl(img.view(), abnormal_line_factor))
}
