//! Quantized activation layers

use super::module::{CachedIO, CachingFlags, ExportState, QuantModule};
use crate::autograd::{relu, Tensor};
use crate::quant::FakeQuantize;
use std::any::Any;

/// ReLU followed by fake quantization of the activation
pub struct QuantReLU {
    act_quant: FakeQuantize,
    caching: CachingFlags,
    export: ExportState,
    cached_out: Option<CachedIO>,
}

impl QuantReLU {
    /// Create with an 8-bit symmetric activation quantizer
    pub fn new() -> Self {
        Self {
            act_quant: FakeQuantize::q8(),
            caching: CachingFlags::new(),
            export: ExportState::default(),
            cached_out: None,
        }
    }

    /// Replace the activation quantizer, builder-style
    pub fn with_act_quant(mut self, act_quant: FakeQuantize) -> Self {
        self.act_quant = act_quant;
        self
    }

    pub fn act_quant(&self) -> &FakeQuantize {
        &self.act_quant
    }

    /// Quantized output representation retained by the last caching forward
    pub fn cached_out(&self) -> Option<&CachedIO> {
        self.cached_out.as_ref()
    }
}

impl Default for QuantReLU {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantModule for QuantReLU {
    fn layer_name(&self) -> &'static str {
        "QuantReLU"
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let activated = relu(input);
        let out = self.act_quant.forward_with_calibration(&activated);

        if self.caching.cache_inference_quant_out {
            let metadata_only = self.caching.cache_quant_io_metadata_only;
            self.cached_out = Some(CachedIO {
                metadata: self.act_quant.metadata(),
                len: out.len(),
                value: (!metadata_only).then(|| out.detach()),
            });
        }

        if let ExportState { export_mode: true, handler: Some(handler) } = &mut self.export {
            handler.record(input, &out);
        }

        out
    }

    fn caching_flags_mut(&mut self) -> Option<&mut CachingFlags> {
        Some(&mut self.caching)
    }

    fn export_mut(&mut self) -> Option<&mut ExportState> {
        Some(&mut self.export)
    }

    fn requires_export_handler(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
