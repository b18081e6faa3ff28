//! Straight-Through Estimator (STE) operators
//!
//! Each operator applies a non-differentiable elementwise function on the
//! forward pass and behaves like the identity on the backward pass: the
//! gradient reaching the output is handed to the input unmodified. This is
//! what lets gradient-based training optimize through rounding, sign and
//! clamping steps that have zero or undefined derivatives almost everywhere.
//!
//! Forward values are computed by the process-wide kernel backend selected in
//! [`super::backend`].

use super::backend::active_kernels;
use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Identity backward: pass the output gradient straight to the input.
struct SteBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SteBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }

            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

fn with_identity_backward(x: &Tensor, data: Array1<f32>) -> Tensor {
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SteBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Round to the nearest integer (ties away from zero), STE backward
pub fn round_ste(x: &Tensor) -> Tensor {
    with_identity_backward(x, active_kernels().round(x.data()))
}

/// Round up to the next integer, STE backward
pub fn ceil_ste(x: &Tensor) -> Tensor {
    with_identity_backward(x, active_kernels().ceil(x.data()))
}

/// Round down to the previous integer, STE backward
pub fn floor_ste(x: &Tensor) -> Tensor {
    with_identity_backward(x, active_kernels().floor(x.data()))
}

pub fn round_to_zero_ste(x: &Tensor) -> Tensor {
    with_identity_backward(x, active_kernels().round_to_zero(x.data()))
}

/// Binarize to ±1 (+1 for x ≥ 0, −1 otherwise), STE backward
pub fn binary_sign_ste(x: &Tensor) -> Tensor {
    with_identity_backward(x, active_kernels().binary_sign(x.data()))
}

/// Three-valued sign (−1, 0, +1), STE backward
pub fn ternary_sign_ste(x: &Tensor) -> Tensor {
    with_identity_backward(x, active_kernels().ternary_sign(x.data()))
}

/// Clamp each element into `[min_val, max_val]` taken from tensors, STE backward
///
/// The bounds must have the input's length or length 1 (broadcast). The
/// gradient passes through unmodified regardless of whether clamping
/// occurred; the bounds themselves receive no gradient.
pub fn tensor_clamp_ste(x: &Tensor, min_val: &Tensor, max_val: &Tensor) -> Tensor {
    let data = active_kernels().tensor_clamp(x.data(), min_val.data(), max_val.data());
    with_identity_backward(x, data)
}

/// Clamp each element into the constant range `[min_val, max_val]`, STE backward
pub fn scalar_clamp_ste(x: &Tensor, min_val: f32, max_val: f32) -> Tensor {
    with_identity_backward(x, active_kernels().scalar_clamp(x.data(), min_val, max_val))
}

/// Clamp each element to at least `min_val`, STE backward
pub fn scalar_clamp_min_ste(x: &Tensor, min_val: f32) -> Tensor {
    with_identity_backward(x, active_kernels().scalar_clamp_min(x.data(), min_val))
}
