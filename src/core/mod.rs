//! Core parameterizations for quantization-aware training

pub mod bit_width;
pub mod restrict;

pub use bit_width::{
    BitWidthConst, BitWidthImpl, BitWidthParameter, IdentityBitWidth, MsbClampBitWidth,
    RemoveBitwidthParameter, MIN_INT_BIT_WIDTH, NON_ZERO_EPSILON, REMOVE_ZERO_BIT_WIDTH,
};
pub use restrict::{
    ClampedRestrict, IdentityRestrict, IntRestrict, PowerOfTwoRestrict, RestrictBitWidth,
};
