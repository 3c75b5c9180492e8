//! Scalar statistics shared by the metric primitives.
//!
//! All helpers work on f64 samples and return 0.0 for empty input so callers
//! never see NaN from a degenerate reduction.

/// Normal-consistency constant: sigma = MAD_TO_SIGMA * MAD for Gaussian data.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Arithmetic mean.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance (two-pass).
pub fn variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / data.len() as f64
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Root mean square.
pub fn rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    (data.iter().map(|&x| x * x).sum::<f64>() / data.len() as f64).sqrt()
}

/// Median using partial selection. Reorders `data`.
pub fn median_in_place(data: &mut [f64]) -> f64 {
    let len = data.len();
    if len == 0 {
        return 0.0;
    }
    let mid = len / 2;

    // select_nth_unstable finds the median in O(n)
    let (left, &mut upper, _) = data.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));

    if len % 2 == 1 {
        upper
    } else {
        // Everything left of mid is <= upper; the lower middle is its maximum.
        let lower = left.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lower + upper) / 2.0
    }
}

/// Median of a borrowed slice.
pub fn median(data: &[f64]) -> f64 {
    let mut buf = data.to_vec();
    median_in_place(&mut buf)
}

/// Unscaled median absolute deviation around the median.
pub fn mad(data: &[f64]) -> f64 {
    let center = median(data);
    let mut deviations: Vec<f64> = data.iter().map(|&x| (x - center).abs()).collect();
    median_in_place(&mut deviations)
}

/// Robust sigma estimate: 1.4826 * MAD.
///
/// Falls back to the standard deviation when the MAD is zero, which happens
/// when more than half of the samples are identical.
pub fn robust_sigma(data: &[f64]) -> f64 {
    let m = mad(data);
    if m == 0.0 {
        std_dev(data)
    } else {
        MAD_TO_SIGMA * m
    }
}

/// Pearson correlation coefficient of two equally long sequences.
///
/// Returns 0.0 when either sequence has zero variance or fewer than two
/// samples are available.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let ma = mean(a);
    let mb = mean(b);

    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }

    let denom = (va * vb).sqrt();
    if denom <= f64::MIN_POSITIVE {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Replace NaN/Inf with `fallback`.
#[inline]
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
