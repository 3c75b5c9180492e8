//! Float trait abstraction for f32/f64 input images.
//!
//! Microscope frames arrive either as normalized f64 data or as 8/16-bit
//! counts promoted to f32. Every metric accepts both; internally all
//! statistics are accumulated in f64.

use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for the sample types accepted by the analyzer and filters.
///
/// Combines the bounds needed by the metric primitives:
/// - Basic float operations (Float, NumAssign)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Thread safety for parallel grid evaluation (Send, Sync)
pub trait NoiseFloat:
    Float + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Widen to f64 for accumulation.
    fn as_f64(self) -> f64;
}

impl NoiseFloat for f32 {
    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl NoiseFloat for f64 {
    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_trait_impl() {
        let val: f32 = NoiseFloat::from_f64_c(std::f64::consts::PI);
        assert!((val - std::f32::consts::PI).abs() < 1e-5);
        assert!((val.as_f64() - std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_f64_trait_impl() {
        let val: f64 = NoiseFloat::from_f64_c(std::f64::consts::E);
        assert_eq!(val.as_f64(), std::f64::consts::E);
    }
}
