//! Tests for the bit-width parameterization engine.

use super::*;
use crate::autograd::{backward, sum};
use crate::core::restrict::{ClampedRestrict, IdentityRestrict, IntRestrict, PowerOfTwoRestrict};
use crate::io::StateDict;
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

// ========================================================================
// PROPERTY TESTS - range invariants
// ========================================================================

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(200))]

    /// The effective bit width never undershoots the configured minimum,
    /// whatever value the optimizer drives the raw offset to.
    #[test]
    fn prop_bit_width_never_below_minimum(
        target in 2u32..16,
        learned_offset in -20.0f32..20.0,
    ) {
        let mut param = BitWidthParameter::new(
            target, Some(2), Box::new(IdentityRestrict), false,
        ).unwrap();
        param.offset_mut().data_mut()[0] = learned_offset;

        let out = param.forward().item();
        prop_assert!(out >= 2.0 - 1e-6, "bit width {} fell below the minimum", out);
    }

    /// The removal amount stays finite and positive for any coefficient.
    #[test]
    fn prop_removal_always_finite(coeff in -100.0f32..100.0) {
        let mut param = RemoveBitwidthParameter::new(4.0, false).unwrap();
        param.coeff_mut().data_mut()[0] = coeff;

        let out = param.forward().item();
        prop_assert!(out.is_finite());
        prop_assert!(out > 0.0);
    }

    /// Initialization inverts the reparameterization: forward reproduces the
    /// requested target under the identity restriction.
    #[test]
    fn prop_init_reproduces_target(target in 2u32..32) {
        let param = BitWidthParameter::new(
            target, Some(2), Box::new(IdentityRestrict), false,
        ).unwrap();
        let out = param.forward().item();
        prop_assert!((out - target as f32).abs() < 1e-5);
    }

    /// Same for the removal variant with non-zero targets.
    #[test]
    fn prop_removal_init_reproduces_target(target in 0.5f32..16.0) {
        let param = RemoveBitwidthParameter::new(target, false).unwrap();
        let out = param.forward().item();
        // 1/(ε + 1/t) ≈ t for small ε
        prop_assert!((out - target).abs() < 1e-3, "got {}, want {}", out, target);
    }
}

// ========================================================================
// UNIT TESTS - construction and forward
// ========================================================================

#[test]
fn test_forward_at_init_equals_target() {
    let param = BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    assert_abs_diff_eq!(param.forward().item(), 4.0, epsilon = 1e-6);
}

#[test]
fn test_forward_with_default_minimum() {
    let param = BitWidthParameter::new(8, None, Box::new(IdentityRestrict), false).unwrap();
    assert_abs_diff_eq!(param.forward().item(), 8.0, epsilon = 1e-6);
    assert_abs_diff_eq!(param.base(), 2.0, epsilon = 1e-6);
}

#[test]
fn test_bit_width_one_rejected() {
    let result = BitWidthParameter::new(1, Some(2), Box::new(IdentityRestrict), false);
    assert!(result.is_err());
    if let Err(err) = result {
        assert!(err.to_string().contains("at least 2"));
        assert!(err.to_string().contains('1'));
    }
}

#[test]
fn test_bit_width_two_accepted() {
    let param = BitWidthParameter::new(2, Some(2), Box::new(IdentityRestrict), false).unwrap();
    assert_abs_diff_eq!(param.forward().item(), 2.0, epsilon = 1e-6);
}

#[test]
fn test_min_overall_below_two_rejected() {
    let result = BitWidthParameter::new(4, Some(1), Box::new(IdentityRestrict), false);
    assert!(result.is_err());
}

#[test]
fn test_int_restrict_rounds_learned_value() {
    let mut param = BitWidthParameter::new(4, Some(2), Box::new(IntRestrict), false).unwrap();
    param.offset_mut().data_mut()[0] = 1.3;
    // |1.3| + 2 = 3.3, rounded to 3
    assert_abs_diff_eq!(param.forward().item(), 3.0, epsilon = 1e-6);
}

#[test]
fn test_power_of_two_restrict() {
    let param = BitWidthParameter::new(6, Some(2), Box::new(PowerOfTwoRestrict), false).unwrap();
    // restrict_init_float(6) = 8, base = 2, offset = 6; forward = 2^round(log2(8)) = 8
    assert_abs_diff_eq!(param.forward().item(), 8.0, epsilon = 1e-3);
}

#[test]
fn test_clamped_restrict_caps_learned_value() {
    let mut param =
        BitWidthParameter::new(4, Some(2), Box::new(ClampedRestrict::new(2.0, 8.0)), false)
            .unwrap();
    param.offset_mut().data_mut()[0] = 100.0;
    assert_abs_diff_eq!(param.forward().item(), 8.0, epsilon = 1e-6);
}

#[test]
fn test_gradient_reaches_offset() {
    let param = BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    let mut out = sum(&param.forward());
    backward(&mut out, None);

    // offset init is 2.0 > 0, so ∂bit_width/∂offset = sign(offset) = 1
    let grad = param.offset().grad().unwrap();
    assert_abs_diff_eq!(grad[0], 1.0, epsilon = 1e-6);
}

// ========================================================================
// UNIT TESTS - removal variant
// ========================================================================

#[test]
fn test_remove_zero_target_uses_substitute() {
    let param = RemoveBitwidthParameter::new(0.0, false).unwrap();
    // coeff = 1/0.1 = 10; forward = 1/(1e-6 + 10)
    let expected = 1.0 / (NON_ZERO_EPSILON + 1.0 / REMOVE_ZERO_BIT_WIDTH);
    assert_abs_diff_eq!(param.forward().item(), expected, epsilon = 1e-7);
}

#[test]
fn test_remove_negative_target_rejected() {
    let result = RemoveBitwidthParameter::new(-1.0, false);
    assert!(result.is_err());
    if let Err(err) = result {
        assert!(err.to_string().contains(">= 0"));
    }
}

#[test]
fn test_remove_gradient_reaches_coeff() {
    let param = RemoveBitwidthParameter::new(4.0, false).unwrap();
    let mut out = sum(&param.forward());
    backward(&mut out, None);
    assert!(param.coeff().grad().is_some());
}

#[test]
fn test_msb_clamp_stays_in_range() {
    let remove = RemoveBitwidthParameter::new(2.0, false).unwrap();
    let clamp = MsbClampBitWidth::new(remove, 2, 8).unwrap();

    // 8 - 2 = 6, inside [2, 8]
    let out = clamp.forward(&crate::autograd::Tensor::scalar(8.0, false));
    assert_abs_diff_eq!(out.item(), 6.0, epsilon = 1e-3);

    // 3 - 2 = 1, clamped up to 2
    let out = clamp.forward(&crate::autograd::Tensor::scalar(3.0, false));
    assert_abs_diff_eq!(out.item(), 2.0, epsilon = 1e-3);
}

#[test]
fn test_msb_clamp_invalid_range_rejected() {
    let remove = RemoveBitwidthParameter::new(2.0, false).unwrap();
    assert!(MsbClampBitWidth::new(remove, 8, 2).is_err());
}

#[test]
fn test_bit_width_const_and_identity() {
    let c = BitWidthConst::new(8);
    assert_abs_diff_eq!(c.forward().item(), 8.0, epsilon = 1e-6);

    let ident = IdentityBitWidth;
    let x = crate::autograd::Tensor::scalar(5.0, false);
    assert_abs_diff_eq!(ident.forward(&x).item(), 5.0, epsilon = 1e-6);
}

#[test]
fn test_bit_width_impl_dispatch() {
    let c = BitWidthImpl::Const(BitWidthConst::new(8));
    assert_abs_diff_eq!(c.forward().item(), 8.0, epsilon = 1e-6);

    let p = BitWidthImpl::Parameter(
        BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap(),
    );
    assert_abs_diff_eq!(p.forward().item(), 4.0, epsilon = 1e-6);
}

// ========================================================================
// UNIT TESTS - persistence
// ========================================================================

#[test]
fn test_state_round_trip_reproduces_forward() {
    let mut original =
        BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    original.offset_mut().data_mut()[0] = 3.25;
    let trained_out = original.forward().item();

    let mut state = StateDict::new();
    original.state_dict("", &mut state);
    assert!(state.contains_key(BIT_WIDTH_OFFSET_KEY));

    let mut reloaded =
        BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    let mut missing = Vec::new();
    reloaded.load_state_dict(&mut state, "", &mut missing);

    assert!(missing.is_empty());
    assert_abs_diff_eq!(reloaded.forward().item(), trained_out, epsilon = 1e-6);
}

#[test]
fn test_override_pretrained_keeps_fresh_init() {
    let mut original =
        BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    original.offset_mut().data_mut()[0] = 3.25;

    let mut state = StateDict::new();
    original.state_dict("", &mut state);

    // Override requested: the saved offset is discarded, the fresh one wins.
    let mut reloaded =
        BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), true).unwrap();
    let fresh_out = reloaded.forward().item();
    let mut missing = Vec::new();
    reloaded.load_state_dict(&mut state, "", &mut missing);

    assert_abs_diff_eq!(reloaded.forward().item(), fresh_out, epsilon = 1e-6);
    assert!(!state.contains_key(BIT_WIDTH_OFFSET_KEY), "saved value was discarded");
}

#[test]
fn test_missing_key_reported() {
    let mut param = BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    let mut state = StateDict::new();
    let mut missing = Vec::new();
    param.load_state_dict(&mut state, "layer1.", &mut missing);

    // CUANTIZAR_IGNORE_MISSING_KEYS defaults to false in the test environment.
    if !crate::config::ignore_missing_keys() {
        assert_eq!(missing, vec![format!("layer1.{BIT_WIDTH_OFFSET_KEY}")]);
    }
}

#[test]
fn test_state_dict_prefix() {
    let param = BitWidthParameter::new(4, Some(2), Box::new(IdentityRestrict), false).unwrap();
    let mut state = StateDict::new();
    param.state_dict("block.quant.", &mut state);
    assert!(state.contains_key("block.quant.bit_width_offset"));
}

#[test]
fn test_remove_state_round_trip_with_override() {
    let mut original = RemoveBitwidthParameter::new(4.0, false).unwrap();
    original.coeff_mut().data_mut()[0] = 0.7;

    let mut state = StateDict::new();
    original.state_dict("", &mut state);
    assert!(state.contains_key(BIT_WIDTH_COEFF_KEY));

    // Plain reload tracks the trained coefficient.
    let mut reloaded = RemoveBitwidthParameter::new(4.0, false).unwrap();
    let mut missing = Vec::new();
    reloaded.load_state_dict(&mut state.clone(), "", &mut missing);
    assert_abs_diff_eq!(reloaded.coeff().data()[0], 0.7, epsilon = 1e-6);

    // Override reload keeps the fresh initialization.
    let mut overridden = RemoveBitwidthParameter::new(4.0, true).unwrap();
    let fresh = overridden.forward().item();
    let mut missing = Vec::new();
    overridden.load_state_dict(&mut state, "", &mut missing);
    assert_abs_diff_eq!(overridden.forward().item(), fresh, epsilon = 1e-6);
}
