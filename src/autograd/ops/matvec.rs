//! Matrix-vector product over a flattened row-major weight

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Multiply a `[d_out * d_in]` row-major weight by a `[d_in]` vector
///
/// # Panics
/// Panics when the operand lengths do not match the given dimensions.
pub fn matvec(weight: &Tensor, x: &Tensor, d_out: usize, d_in: usize) -> Tensor {
    assert_eq!(weight.len(), d_out * d_in, "weight length must be d_out * d_in");
    assert_eq!(x.len(), d_in, "input length must be d_in");

    let w = weight.data();
    let v = x.data();
    let mut out = vec![0.0f32; d_out];
    for (i, out_i) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for j in 0..d_in {
            acc += w[i * d_in + j] * v[j];
        }
        *out_i = acc;
    }

    let requires_grad = weight.requires_grad() || x.requires_grad();
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatVecBackward {
            weight: weight.clone(),
            x: x.clone(),
            d_out,
            d_in,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatVecBackward {
    weight: Tensor,
    x: Tensor,
    d_out: usize,
    d_in: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MatVecBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.weight.requires_grad() {
                // ∂L/∂W[i,j] = g[i] * x[j]
                let v = self.x.data();
                let mut grad_w = vec![0.0f32; self.d_out * self.d_in];
                for i in 0..self.d_out {
                    for j in 0..self.d_in {
                        grad_w[i * self.d_in + j] = grad[i] * v[j];
                    }
                }
                self.weight.accumulate_grad(Array1::from(grad_w));
            }
            if self.x.requires_grad() {
                // ∂L/∂x[j] = Σ_i g[i] * W[i,j]
                let w = self.weight.data();
                let mut grad_x = vec![0.0f32; self.d_in];
                for (j, grad_j) in grad_x.iter_mut().enumerate() {
                    let mut acc = 0.0;
                    for i in 0..self.d_out {
                        acc += grad[i] * w[i * self.d_in + j];
                    }
                    *grad_j = acc;
                }
                self.x.accumulate_grad(Array1::from(grad_x));
            }

            if let Some(op) = self.weight.backward_op() {
                op.backward();
            }
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}
