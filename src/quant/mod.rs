//! Fake quantization and quantized-tensor metadata

mod fake_quantize;
mod quant_tensor;

pub use fake_quantize::FakeQuantize;
pub use quant_tensor::{QuantMetadata, QuantTensor};
