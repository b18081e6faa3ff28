//! Quantized tensor wrapper and its serializable metadata

use crate::autograd::Tensor;
use serde::{Deserialize, Serialize};

/// Quantization metadata attached to a tensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantMetadata {
    /// Scale factor
    pub scale: Option<f32>,
    /// Zero point for asymmetric quantization
    pub zero_point: Option<i32>,
    /// Effective bit width
    pub bit_width: Option<f32>,
    /// Whether the integer range is signed
    pub signed: Option<bool>,
}

impl QuantMetadata {
    /// Metadata with every field unset
    pub fn empty() -> Self {
        Self { scale: None, zero_point: None, bit_width: None, signed: None }
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_none()
            && self.zero_point.is_none()
            && self.bit_width.is_none()
            && self.signed.is_none()
    }
}

/// A tensor value together with its quantization metadata
#[derive(Clone)]
pub struct QuantTensor {
    /// The (de)quantized value in floating point
    pub value: Tensor,
    /// How the value maps onto the integer grid
    pub metadata: QuantMetadata,
}

impl QuantTensor {
    /// Wrap a plain tensor with no metadata
    pub fn from_value(value: Tensor) -> Self {
        Self { value, metadata: QuantMetadata::empty() }
    }

    /// Wrap a tensor with full quantization metadata
    pub fn new(value: Tensor, scale: f32, zero_point: i32, bit_width: f32, signed: bool) -> Self {
        Self {
            value,
            metadata: QuantMetadata {
                scale: Some(scale),
                zero_point: Some(zero_point),
                bit_width: Some(bit_width),
                signed: Some(signed),
            },
        }
    }

    /// Number of elements in the wrapped value
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether quantization metadata is present
    pub fn is_quantized(&self) -> bool {
        !self.metadata.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_has_no_metadata() {
        let qt = QuantTensor::from_value(Tensor::from_vec(vec![1.0, 2.0], false));
        assert_eq!(qt.len(), 2);
        assert!(!qt.is_quantized());
    }

    #[test]
    fn test_new_carries_metadata() {
        let qt = QuantTensor::new(Tensor::from_vec(vec![1.0], false), 0.5, 0, 8.0, true);
        assert!(qt.is_quantized());
        assert_eq!(qt.metadata.scale, Some(0.5));
        assert_eq!(qt.metadata.bit_width, Some(8.0));
        assert_eq!(qt.metadata.signed, Some(true));
    }

    #[test]
    fn test_metadata_serde_round_trip() {
        let meta = QuantMetadata {
            scale: Some(0.25),
            zero_point: Some(3),
            bit_width: Some(4.0),
            signed: Some(false),
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: QuantMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}
