//! Fake quantization with straight-through gradients
//!
//! Fake quantization simulates quantization noise during training: the
//! forward pass quantizes and immediately dequantizes, the backward pass
//! sees the identity thanks to the STE operators, so the model can adapt to
//! the noise while gradients keep flowing. The integer grid may come from a
//! fixed or a learnable bit width.

use super::quant_tensor::{QuantMetadata, QuantTensor};
use crate::autograd::{add_scalar, scale, Tensor};
use crate::core::BitWidthImpl;
use crate::function::{round_ste, scalar_clamp_ste};

/// Fake quantization over a configurable integer grid
///
/// Holds calibrated scale and zero-point and a bit-width provider, which may
/// be a fixed constant or a learnable parameterization.
pub struct FakeQuantize {
    bit_width_impl: BitWidthImpl,
    symmetric: bool,
    scale: f32,
    zero_point: i32,
    initialized: bool,
}

impl FakeQuantize {
    /// Create a fake quantizer over the given bit-width provider
    pub fn new(bit_width_impl: BitWidthImpl, symmetric: bool) -> Self {
        Self {
            bit_width_impl,
            symmetric,
            scale: 1.0,
            zero_point: 0,
            initialized: false,
        }
    }

    /// 4-bit symmetric quantization with a fixed bit width
    pub fn q4() -> Self {
        Self::new(BitWidthImpl::Const(crate::core::BitWidthConst::new(4)), true)
    }

    /// 8-bit symmetric quantization with a fixed bit width
    pub fn q8() -> Self {
        Self::new(BitWidthImpl::Const(crate::core::BitWidthConst::new(8)), true)
    }

    /// Integer grid bounds for the current bit width
    fn int_range(&self, bit_width: f32) -> (f32, f32) {
        if self.symmetric {
            let qmax = (bit_width - 1.0).exp2() - 1.0;
            (-qmax, qmax)
        } else {
            (0.0, bit_width.exp2() - 1.0)
        }
    }

    /// Initialize scale and zero-point from data (min-max calibration)
    ///
    /// For symmetric: scale = max(|min|, |max|) / qmax
    /// For asymmetric: scale = (max - min) / (qmax - qmin)
    pub fn calibrate(&mut self, data: &[f32]) {
        if data.is_empty() {
            return;
        }

        let min_val = data.iter().copied().fold(f32::INFINITY, f32::min);
        let max_val = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let bit_width = self.bit_width_impl.forward().item();
        let (qmin, qmax) = self.int_range(bit_width);

        if self.symmetric {
            let max_abs = min_val.abs().max(max_val.abs());
            self.scale = max_abs / qmax;
            self.zero_point = 0;
        } else {
            self.scale = (max_val - min_val) / (qmax - qmin);
            let zp = (qmin - min_val / self.scale).round();
            self.zero_point = zp.max(qmin).min(qmax) as i32;
        }

        // Prevent division by zero
        if self.scale < 1e-10 {
            self.scale = 1e-10;
        }

        self.initialized = true;
    }

    /// Forward pass: quantize → dequantize with STE gradients
    ///
    /// The output stays in floating point; gradients reach both the input
    /// and a learnable bit-width parameterization unmodified through the
    /// rounding and clamping steps.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let bit_width = self.bit_width_impl.forward().item();
        let (qmin, qmax) = self.int_range(bit_width);

        let scaled = scale(input, 1.0 / self.scale);
        let shifted = if self.symmetric {
            scaled
        } else {
            add_scalar(&scaled, self.zero_point as f32)
        };
        let rounded = round_ste(&shifted);
        let clamped = scalar_clamp_ste(&rounded, qmin, qmax);
        let unshifted = if self.symmetric {
            clamped
        } else {
            add_scalar(&clamped, -(self.zero_point as f32))
        };
        scale(&unshifted, self.scale)
    }

    /// Forward pass with auto-calibration on first use
    pub fn forward_with_calibration(&mut self, input: &Tensor) -> Tensor {
        if !self.initialized {
            self.calibrate(input.data().as_slice().unwrap_or(&[]));
        }
        self.forward(input)
    }

    /// Quantize and wrap the result with its metadata
    pub fn quantize(&self, input: &Tensor) -> QuantTensor {
        let value = self.forward(input);
        QuantTensor {
            value,
            metadata: self.metadata(),
        }
    }

    /// The quantizer's current metadata
    pub fn metadata(&self) -> QuantMetadata {
        QuantMetadata {
            scale: Some(self.scale),
            zero_point: Some(self.zero_point),
            bit_width: Some(self.bit_width_impl.forward().item()),
            signed: Some(self.symmetric),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zero_point(&self) -> i32 {
        self.zero_point
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The bit-width provider
    pub fn bit_width_impl(&self) -> &BitWidthImpl {
        &self.bit_width_impl
    }

    pub fn bit_width_impl_mut(&mut self) -> &mut BitWidthImpl {
        &mut self.bit_width_impl
    }
}
