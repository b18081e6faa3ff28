//! 1-D f32 tensor with a shared gradient cell
//!
//! The tensor is the narrow contract between the quantization primitives and
//! the numeric runtime: elementwise arithmetic lives on `ndarray`, gradient
//! state lives in a shared `Rc<RefCell>` cell so backward ops reach the same
//! storage the caller observes.

use super::backward::BackwardOp;
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// A 1-D f32 tensor participating in the gradient tape
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    requires_grad: bool,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    backward_op: Option<Rc<dyn BackwardOp>>,
}

impl Tensor {
    /// Create a tensor from an ndarray array
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data,
            requires_grad,
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
        }
    }

    /// Create a tensor from a plain vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a zero-filled tensor
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Create a one-filled tensor
    pub fn ones(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::ones(len), requires_grad)
    }

    /// Create a single-element tensor
    pub fn scalar(value: f32, requires_grad: bool) -> Self {
        Self::from_vec(vec![value], requires_grad)
    }

    /// Borrow the underlying data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutably borrow the underlying data
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extract the value of a single-element tensor
    ///
    /// # Panics
    /// Panics if the tensor does not hold exactly one element.
    pub fn item(&self) -> f32 {
        assert_eq!(self.data.len(), 1, "item() requires a single-element tensor");
        self.data[0]
    }

    /// Whether gradients are tracked for this tensor
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Current accumulated gradient, if any
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Replace the accumulated gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Clear the accumulated gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Add into the accumulated gradient, initializing it when absent
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut cell = self.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing = &*existing + &grad,
            None => *cell = Some(grad),
        }
    }

    /// Shared handle to the gradient cell, for backward ops
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// The op that produced this tensor, if it was produced by one
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Attach the producing op to this tensor
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// A gradient-detached copy sharing nothing with this tensor
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.data.clone(), false)
    }
}
