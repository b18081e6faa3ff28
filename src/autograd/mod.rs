//! Tape-based autograd engine
//!
//! Provides automatic differentiation using a computational graph with
//! gradient tape. Ops record a [`BackwardOp`] on their output; calling
//! [`backward`] on a scalar loss walks the tape and accumulates gradients
//! into each tensor's shared gradient cell.

mod backward;
pub mod ops;
mod tensor;

pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

/// Perform backward pass on a tensor
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        // Initialize with ones for scalar loss
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
