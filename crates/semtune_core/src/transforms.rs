use ndarray::{Array2, ArrayView2};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Row and column FFT plans for one image geometry.
pub struct Fft2dPlans {
    row: Arc<dyn Fft<f64>>,
    col: Arc<dyn Fft<f64>>,
}

impl Fft2dPlans {
    /// Plan forward transforms for a `rows x cols` image.
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            row: planner.plan_fft_forward(cols),
            col: planner.plan_fft_forward(rows),
        }
    }
}

/// Compute the unnormalized 2D FFT of a real image.
/// Output uses the standard layout with DC at (0, 0).
pub fn fft2d(input: ArrayView2<f64>, plans: &Fft2dPlans) -> Array2<Complex<f64>> {
    let (rows, cols) = input.dim();

    // 1. Transform rows
    let mut intermediate = Array2::<Complex<f64>>::zeros((rows, cols));
    let mut row_vec = vec![Complex::new(0.0, 0.0); cols];

    for r in 0..rows {
        for (c, &v) in input.row(r).iter().enumerate() {
            row_vec[c] = Complex::new(v, 0.0);
        }
        plans.row.process(&mut row_vec);
        for c in 0..cols {
            intermediate[[r, c]] = row_vec[c];
        }
    }

    // 2. Transform columns in place
    let mut col_vec = vec![Complex::new(0.0, 0.0); rows];

    for c in 0..cols {
        for r in 0..rows {
            col_vec[r] = intermediate[[r, c]];
        }
        plans.col.process(&mut col_vec);
        for r in 0..rows {
            intermediate[[r, c]] = col_vec[r];
        }
    }

    intermediate
}

/// Move the DC bin to the centre, like numpy's `fftshift`.
pub fn fftshift(input: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = input.dim();
    let (sr, sc) = (rows / 2, cols / 2);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        input[[(r + rows - sr) % rows, (c + cols - sc) % cols]]
    })
}
