//! # cuantizar
//!
//! Quantization-aware training (QAT) primitives: straight-through-estimator
//! operators, a learnable bit-width parameterization engine, fake
//! quantization, and an export controller that records trained quantized
//! modules into a serializable traced graph.
//!
//! ## Straight-through estimators
//!
//! Rounding, sign and clamping have zero or undefined derivatives almost
//! everywhere, so training through them needs a decoupled gradient rule: the
//! forward pass applies the real operation, the backward pass behaves like
//! the identity. The [`function`] module provides these operators over the
//! tape-based autograd in [`autograd`], with a kernel backend selected once
//! per process (see [`function::backend`]).
//!
//! ## Learnable bit widths
//!
//! The [`core`] module models bit widths as continuous learnable surrogates
//! kept inside valid ranges by reparameterization: an offset above a
//! restricted floor, or a bounded reciprocal for the removal variant.
//!
//! ```
//! use cuantizar::core::{BitWidthParameter, IdentityRestrict};
//! use cuantizar::function::round_ste;
//! use cuantizar::Tensor;
//!
//! let bit_width = BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false)?;
//! assert!((bit_width.forward().item() - 4.0).abs() < 1e-6);
//!
//! let x = Tensor::from_vec(vec![0.4, 1.6], true);
//! let y = round_ste(&x);
//! assert_eq!(y.data()[0], 0.0);
//! assert_eq!(y.data()[1], 2.0);
//! # Ok::<(), cuantizar::Error>(())
//! ```
//!
//! ## Export
//!
//! [`export::ExportManager::trace`] primes quantization-metadata caches with
//! one forward pass, restores every caching flag exactly, then records a
//! second pass into per-layer handlers, producing an [`export::TracedGraph`].

pub mod autograd;
pub mod config;
pub mod core;
mod error;
pub mod export;
pub mod function;
pub mod io;
pub mod nn;
pub mod optim;
pub mod quant;

pub use autograd::Tensor;
pub use error::{Error, Result};
