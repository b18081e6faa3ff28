//! Restriction functions for learnable quantization parameters
//!
//! A restriction function is a monotone mapping that keeps a raw
//! parameterized value inside a valid numeric domain. The differentiable
//! [`RestrictBitWidth::restrict`] runs every forward pass and is built from
//! STE operators so gradients survive the discretization;
//! [`RestrictBitWidth::restrict_init_float`] is the plain-float counterpart
//! used once at construction to invert initial values.

use crate::autograd::{exp2, log2, Tensor};
use crate::function::{round_ste, scalar_clamp_ste};

/// Monotone restriction applied to a raw bit-width value
pub trait RestrictBitWidth {
    /// Restrict a tensor value, differentiably
    fn restrict(&self, x: &Tensor) -> Tensor;

    /// Restrict a plain float at initialization time
    fn restrict_init_float(&self, x: f32) -> f32;
}

/// No restriction: the raw value is already valid
pub struct IdentityRestrict;

impl RestrictBitWidth for IdentityRestrict {
    fn restrict(&self, x: &Tensor) -> Tensor {
        x.clone()
    }

    fn restrict_init_float(&self, x: f32) -> f32 {
        x
    }
}

/// Round to the nearest integer via STE
pub struct IntRestrict;

impl RestrictBitWidth for IntRestrict {
    fn restrict(&self, x: &Tensor) -> Tensor {
        round_ste(x)
    }

    fn restrict_init_float(&self, x: f32) -> f32 {
        x.round()
    }
}

/// Round to the nearest power of two via STE
pub struct PowerOfTwoRestrict;

impl RestrictBitWidth for PowerOfTwoRestrict {
    fn restrict(&self, x: &Tensor) -> Tensor {
        exp2(&round_ste(&log2(x)))
    }

    fn restrict_init_float(&self, x: f32) -> f32 {
        x.log2().round().exp2()
    }
}

/// Clamp into a fixed `[min, max]` range via STE
pub struct ClampedRestrict {
    min: f32,
    max: f32,
}

impl ClampedRestrict {
    pub fn new(min: f32, max: f32) -> Self {
        assert!(min <= max, "clamp range must satisfy min <= max");
        Self { min, max }
    }
}

impl RestrictBitWidth for ClampedRestrict {
    fn restrict(&self, x: &Tensor) -> Tensor {
        scalar_clamp_ste(x, self.min, self.max)
    }

    fn restrict_init_float(&self, x: f32) -> f32 {
        x.max(self.min).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_restrict() {
        let r = IdentityRestrict;
        assert_eq!(r.restrict_init_float(3.7), 3.7);

        let x = Tensor::scalar(3.7, false);
        assert_abs_diff_eq!(r.restrict(&x).item(), 3.7, epsilon = 1e-6);
    }

    #[test]
    fn test_int_restrict() {
        let r = IntRestrict;
        assert_eq!(r.restrict_init_float(3.4), 3.0);
        assert_eq!(r.restrict_init_float(3.6), 4.0);

        let x = Tensor::scalar(3.6, false);
        assert_abs_diff_eq!(r.restrict(&x).item(), 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_power_of_two_restrict() {
        let r = PowerOfTwoRestrict;
        assert_abs_diff_eq!(r.restrict_init_float(4.0), 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(r.restrict_init_float(6.0), 8.0, epsilon = 1e-5);
        assert_abs_diff_eq!(r.restrict_init_float(5.0), 4.0, epsilon = 1e-5);

        let x = Tensor::scalar(6.0, false);
        assert_abs_diff_eq!(r.restrict(&x).item(), 8.0, epsilon = 1e-4);
    }

    #[test]
    fn test_clamped_restrict() {
        let r = ClampedRestrict::new(2.0, 8.0);
        assert_eq!(r.restrict_init_float(1.0), 2.0);
        assert_eq!(r.restrict_init_float(10.0), 8.0);
        assert_eq!(r.restrict_init_float(4.0), 4.0);

        let x = Tensor::scalar(10.0, false);
        assert_abs_diff_eq!(r.restrict(&x).item(), 8.0, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "min <= max")]
    fn test_clamped_restrict_invalid_range() {
        ClampedRestrict::new(5.0, 2.0);
    }
}
