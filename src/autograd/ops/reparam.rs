//! Reparameterization ops: abs, add_scalar, recip_offset
//!
//! These keep learnable quantization parameters inside valid numeric ranges
//! while staying differentiable: magnitudes via `abs`, range shifts via
//! `add_scalar`, and bounded reciprocals via `recip_offset`.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Element-wise absolute value
pub fn abs(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::abs);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AbsBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AbsBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AbsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * sign(a), zero at a == 0
                let grad_a = grad * &self.a.data().mapv(|x| if x == 0.0 { 0.0 } else { x.signum() });
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Add a scalar constant to every element
pub fn add_scalar(a: &Tensor, constant: f32) -> Tensor {
    let data = a.data() + constant;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddScalarBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddScalarBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Bounded reciprocal: x ↦ 1 / (epsilon + x)
///
/// The epsilon offset keeps the result finite at x == 0.
pub fn recip_offset(a: &Tensor, epsilon: f32) -> Tensor {
    let data = a.data().mapv(|x| 1.0 / (epsilon + x));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(RecipOffsetBackward {
            a: a.clone(),
            epsilon,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct RecipOffsetBackward {
    a: Tensor,
    epsilon: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for RecipOffsetBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * -1/(ε + a)²
                let eps = self.epsilon;
                let grad_a = grad
                    * &self.a.data().mapv(|x| {
                        let denom = eps + x;
                        -1.0 / (denom * denom)
                    });
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Element-wise base-2 logarithm
pub fn log2(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::log2);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(Log2Backward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct Log2Backward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for Log2Backward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out / (a * ln 2)
                let grad_a = grad * &self.a.data().mapv(|x| 1.0 / (x * std::f32::consts::LN_2));
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Element-wise base-2 exponential
pub fn exp2(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::exp2);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data.clone(), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(Exp2Backward {
            a: a.clone(),
            output: data,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct Exp2Backward {
    a: Tensor,
    output: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for Exp2Backward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * out * ln 2
                let grad_a = grad * &self.output.mapv(|y| y * std::f32::consts::LN_2);
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}
