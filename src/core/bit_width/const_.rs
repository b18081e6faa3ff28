//! Fixed and derived bit-width modules

use super::parameter::RemoveBitwidthParameter;
use crate::autograd::{add, scale, Tensor};
use crate::function::scalar_clamp_ste;
use crate::{Error, Result};

/// A fixed, non-learnable bit width
pub struct BitWidthConst {
    bit_width: f32,
}

impl BitWidthConst {
    pub fn new(bit_width: u32) -> Self {
        Self { bit_width: bit_width as f32 }
    }

    /// The constant bit width as a tensor
    pub fn forward(&self) -> Tensor {
        Tensor::scalar(self.bit_width, false)
    }

    pub fn value(&self) -> f32 {
        self.bit_width
    }
}

/// Pass an upstream bit width through unchanged
pub struct IdentityBitWidth;

impl IdentityBitWidth {
    pub fn forward(&self, input_bit_width: &Tensor) -> Tensor {
        input_bit_width.clone()
    }
}

/// Clamp an upstream bit width after removing a learnable amount
///
/// `output = clamp(input_bit_width - to_remove, min, max)` with STE clamping
/// so the removal coefficient keeps receiving gradients at the range edges.
pub struct MsbClampBitWidth {
    bit_width_to_remove_impl: RemoveBitwidthParameter,
    min_overall_bit_width: f32,
    max_overall_bit_width: f32,
}

impl MsbClampBitWidth {
    pub fn new(
        bit_width_to_remove_impl: RemoveBitwidthParameter,
        min_overall_bit_width: u32,
        max_overall_bit_width: u32,
    ) -> Result<Self> {
        if min_overall_bit_width > max_overall_bit_width {
            return Err(Error::Config(format!(
                "min overall bit width {min_overall_bit_width} exceeds max overall bit width {max_overall_bit_width}"
            )));
        }
        Ok(Self {
            bit_width_to_remove_impl,
            min_overall_bit_width: min_overall_bit_width as f32,
            max_overall_bit_width: max_overall_bit_width as f32,
        })
    }

    pub fn forward(&self, input_bit_width: &Tensor) -> Tensor {
        let to_remove = self.bit_width_to_remove_impl.forward();
        let reduced = add(input_bit_width, &scale(&to_remove, -1.0));
        scalar_clamp_ste(&reduced, self.min_overall_bit_width, self.max_overall_bit_width)
    }

    /// The underlying removal parameterization
    pub fn bit_width_to_remove(&self) -> &RemoveBitwidthParameter {
        &self.bit_width_to_remove_impl
    }

    pub fn bit_width_to_remove_mut(&mut self) -> &mut RemoveBitwidthParameter {
        &mut self.bit_width_to_remove_impl
    }
}
