//! Autograd operations with backward passes
//!
//! This module provides the differentiable operations the quantization
//! parameterization engine is built from.

mod activations;
mod basic;
mod matvec;
mod reparam;

// Re-export all public operations
pub use activations::relu;
pub use basic::{add, mul, scale, sum};
pub use matvec::matvec;
pub use reparam::{abs, add_scalar, exp2, log2, recip_offset};
