//! Learnable bit-width parameterizations
//!
//! Bit widths are modeled as continuous learnable surrogates kept inside
//! their valid ranges by construction, not by projection after the fact:
//! the additive variant learns a non-negative offset above a restricted
//! floor, the removal variant learns the reciprocal of the amount to remove
//! so the result stays finite and positive for any coefficient value.

use super::{MIN_INT_BIT_WIDTH, NON_ZERO_EPSILON, REMOVE_ZERO_BIT_WIDTH};
use crate::autograd::{abs, add_scalar, recip_offset, Tensor};
use crate::core::restrict::RestrictBitWidth;
use crate::io::StateDict;
use crate::{config, Error, Result};
use ndarray::Array1;
use tracing::debug;

/// State-dict key for the additive variant's learnable offset.
pub const BIT_WIDTH_OFFSET_KEY: &str = "bit_width_offset";
/// State-dict key for the removal variant's learnable coefficient.
pub const BIT_WIDTH_COEFF_KEY: &str = "bit_width_coeff";

/// Learnable bit width as a non-negative offset above a restricted floor
///
/// The effective bit width is `restrict(|offset| + base)` where `base` is
/// the restriction of the configured minimum. Since `|offset| >= 0`, the
/// output can never undershoot the restricted minimum, no matter what the
/// optimizer does to the raw offset.
pub struct BitWidthParameter {
    bit_width_offset: Tensor,
    bit_width_base: f32,
    override_pretrained: bool,
    restrict_impl: Box<dyn RestrictBitWidth>,
}

impl BitWidthParameter {
    /// Create a learnable bit width targeting `bit_width` at initialization.
    ///
    /// `min_overall_bit_width` defaults to [`MIN_INT_BIT_WIDTH`]. Both bounds
    /// must be at least [`MIN_INT_BIT_WIDTH`].
    pub fn new(
        bit_width: u32,
        min_overall_bit_width: Option<u32>,
        restrict_impl: Box<dyn RestrictBitWidth>,
        override_pretrained: bool,
    ) -> Result<Self> {
        let min_overall = min_overall_bit_width.unwrap_or(MIN_INT_BIT_WIDTH);
        if bit_width < MIN_INT_BIT_WIDTH {
            return Err(Error::Config(format!(
                "int bit width has to be at least {MIN_INT_BIT_WIDTH}, instead is {bit_width}"
            )));
        }
        if min_overall < MIN_INT_BIT_WIDTH {
            return Err(Error::Config(format!(
                "min overall bit width has to be at least {MIN_INT_BIT_WIDTH}, instead is {min_overall}"
            )));
        }

        let bit_width_base = restrict_impl.restrict_init_float(min_overall as f32);
        let restricted_target = restrict_impl.restrict_init_float(bit_width as f32);
        let offset_init = (restricted_target - bit_width_base).max(0.0);

        Ok(Self {
            bit_width_offset: Tensor::scalar(offset_init, true),
            bit_width_base,
            override_pretrained,
            restrict_impl,
        })
    }

    /// Compute the current effective bit width
    pub fn forward(&self) -> Tensor {
        let bit_width = add_scalar(&abs(&self.bit_width_offset), self.bit_width_base);
        self.restrict_impl.restrict(&bit_width)
    }

    /// The learnable offset parameter
    pub fn offset(&self) -> &Tensor {
        &self.bit_width_offset
    }

    /// Mutable access to the learnable offset, for optimizer updates
    pub fn offset_mut(&mut self) -> &mut Tensor {
        &mut self.bit_width_offset
    }

    /// The restricted floor the offset is added onto
    pub fn base(&self) -> f32 {
        self.bit_width_base
    }

    /// Write this module's parameters under `prefix` into `out`
    pub fn state_dict(&self, prefix: &str, out: &mut StateDict) {
        out.insert(
            format!("{prefix}{BIT_WIDTH_OFFSET_KEY}"),
            self.bit_width_offset.data().to_vec(),
        );
    }

    /// Load this module's parameters from `state` under `prefix`.
    ///
    /// With override-pretrained set, a persisted offset is discarded before
    /// the load so the freshly-initialized value is kept. Keys that end up
    /// missing are pushed into `missing_keys` unless the ignore-missing-keys
    /// flag suppresses the report.
    pub fn load_state_dict(
        &mut self,
        state: &mut StateDict,
        prefix: &str,
        missing_keys: &mut Vec<String>,
    ) {
        let key = format!("{prefix}{BIT_WIDTH_OFFSET_KEY}");
        if self.override_pretrained && state.contains_key(&key) {
            debug!(key = %key, "discarding pretrained bit-width offset");
            state.remove(&key);
        }
        match state.remove(&key) {
            Some(values) => {
                if config::verbose() {
                    debug!(key = %key, "loaded bit-width offset");
                }
                *self.bit_width_offset.data_mut() = Array1::from(values);
            }
            None => {
                if !config::ignore_missing_keys() {
                    missing_keys.push(key);
                }
            }
        }
    }
}

/// Learnable "bit width to remove" via a reciprocal coefficient
///
/// The effective amount is `1 / (epsilon + |coeff|)`; the epsilon keeps the
/// reciprocal bounded and the coefficient is initialized so the reciprocal
/// reproduces the requested target. A target of exactly zero is redirected
/// to a small substitute so the initial coefficient stays finite.
pub struct RemoveBitwidthParameter {
    bit_width_coeff: Tensor,
    non_zero_epsilon: f32,
    override_pretrained: bool,
}

impl RemoveBitwidthParameter {
    /// Create with the default epsilon and zero-substitute constants
    pub fn new(bit_width_to_remove: f32, override_pretrained: bool) -> Result<Self> {
        Self::with_constants(
            bit_width_to_remove,
            override_pretrained,
            NON_ZERO_EPSILON,
            REMOVE_ZERO_BIT_WIDTH,
        )
    }

    /// Create with explicit epsilon and zero-substitute constants
    pub fn with_constants(
        bit_width_to_remove: f32,
        override_pretrained: bool,
        non_zero_epsilon: f32,
        remove_zero_bit_width: f32,
    ) -> Result<Self> {
        if bit_width_to_remove < 0.0 {
            return Err(Error::Config(format!(
                "bit width to remove has to be >= 0, instead is {bit_width_to_remove}"
            )));
        }

        let coeff_init = if bit_width_to_remove == 0.0 {
            1.0 / remove_zero_bit_width
        } else {
            1.0 / bit_width_to_remove
        };

        Ok(Self {
            bit_width_coeff: Tensor::scalar(coeff_init, true),
            non_zero_epsilon,
            override_pretrained,
        })
    }

    /// Compute the current bit width to remove
    pub fn forward(&self) -> Tensor {
        recip_offset(&abs(&self.bit_width_coeff), self.non_zero_epsilon)
    }

    /// The learnable coefficient parameter
    pub fn coeff(&self) -> &Tensor {
        &self.bit_width_coeff
    }

    /// Mutable access to the learnable coefficient, for optimizer updates
    pub fn coeff_mut(&mut self) -> &mut Tensor {
        &mut self.bit_width_coeff
    }

    /// Write this module's parameters under `prefix` into `out`
    pub fn state_dict(&self, prefix: &str, out: &mut StateDict) {
        out.insert(
            format!("{prefix}{BIT_WIDTH_COEFF_KEY}"),
            self.bit_width_coeff.data().to_vec(),
        );
    }

    /// Load this module's parameters from `state` under `prefix`.
    ///
    /// Same override-pretrained and missing-key semantics as
    /// [`BitWidthParameter::load_state_dict`], applied to the coefficient.
    pub fn load_state_dict(
        &mut self,
        state: &mut StateDict,
        prefix: &str,
        missing_keys: &mut Vec<String>,
    ) {
        let key = format!("{prefix}{BIT_WIDTH_COEFF_KEY}");
        if self.override_pretrained && state.contains_key(&key) {
            debug!(key = %key, "discarding pretrained bit-width coefficient");
            state.remove(&key);
        }
        match state.remove(&key) {
            Some(values) => {
                if config::verbose() {
                    debug!(key = %key, "loaded bit-width coefficient");
                }
                *self.bit_width_coeff.data_mut() = Array1::from(values);
            }
            None => {
                if !config::ignore_missing_keys() {
                    missing_keys.push(key);
                }
            }
        }
    }
}
