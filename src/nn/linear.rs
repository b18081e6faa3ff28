//! Quantized linear layer

use super::module::{CachedIO, CachingFlags, ExportState, QuantModule};
use crate::autograd::{add, matvec, Tensor};
use crate::quant::FakeQuantize;
use std::any::Any;

/// Linear layer with fake-quantized input, weight and output
///
/// The weight is stored flattened row-major as `[d_out * d_in]`. Quantizers
/// auto-calibrate on first use; when the caching flags are on, a forward
/// pass retains the quantized input/output/bias representations for export
/// handlers to read.
pub struct QuantLinear {
    weight: Tensor,
    bias: Tensor,
    d_out: usize,
    d_in: usize,
    input_quant: FakeQuantize,
    weight_quant: FakeQuantize,
    output_quant: FakeQuantize,
    caching: CachingFlags,
    export: ExportState,
    cached_inp: Option<CachedIO>,
    cached_out: Option<CachedIO>,
    cached_bias: Option<Tensor>,
}

impl QuantLinear {
    /// Create with 8-bit symmetric quantizers on input, weight and output
    pub fn new(weight: Tensor, bias: Tensor, d_out: usize, d_in: usize) -> Self {
        assert_eq!(weight.len(), d_out * d_in, "weight length must be d_out * d_in");
        assert_eq!(bias.len(), d_out, "bias length must be d_out");

        Self {
            weight,
            bias,
            d_out,
            d_in,
            input_quant: FakeQuantize::q8(),
            weight_quant: FakeQuantize::q8(),
            output_quant: FakeQuantize::q8(),
            caching: CachingFlags::new(),
            export: ExportState::default(),
            cached_inp: None,
            cached_out: None,
            cached_bias: None,
        }
    }

    /// Replace the weight quantizer, builder-style
    pub fn with_weight_quant(mut self, weight_quant: FakeQuantize) -> Self {
        self.weight_quant = weight_quant;
        self
    }

    /// Replace the input quantizer, builder-style
    pub fn with_input_quant(mut self, input_quant: FakeQuantize) -> Self {
        self.input_quant = input_quant;
        self
    }

    /// Replace the output quantizer, builder-style
    pub fn with_output_quant(mut self, output_quant: FakeQuantize) -> Self {
        self.output_quant = output_quant;
        self
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    pub fn weight_quant(&self) -> &FakeQuantize {
        &self.weight_quant
    }

    pub fn input_quant(&self) -> &FakeQuantize {
        &self.input_quant
    }

    pub fn output_quant(&self) -> &FakeQuantize {
        &self.output_quant
    }

    /// Quantized input representation retained by the last caching forward
    pub fn cached_inp(&self) -> Option<&CachedIO> {
        self.cached_inp.as_ref()
    }

    /// Quantized output representation retained by the last caching forward
    pub fn cached_out(&self) -> Option<&CachedIO> {
        self.cached_out.as_ref()
    }

    /// Bias representation retained by the last caching forward
    pub fn cached_bias(&self) -> Option<&Tensor> {
        self.cached_bias.as_ref()
    }
}

impl QuantModule for QuantLinear {
    fn layer_name(&self) -> &'static str {
        "QuantLinear"
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let xq = self.input_quant.forward_with_calibration(input);
        if !self.weight_quant.is_initialized() {
            self.weight_quant.calibrate(self.weight.data().as_slice().unwrap_or(&[]));
        }
        let wq = self.weight_quant.forward(&self.weight);

        let pre = add(&matvec(&wq, &xq, self.d_out, self.d_in), &self.bias);
        let out = self.output_quant.forward_with_calibration(&pre);

        let metadata_only = self.caching.cache_quant_io_metadata_only;
        if self.caching.cache_inference_quant_inp {
            self.cached_inp = Some(CachedIO {
                metadata: self.input_quant.metadata(),
                len: input.len(),
                value: (!metadata_only).then(|| xq.detach()),
            });
        }
        if self.caching.cache_inference_quant_out {
            self.cached_out = Some(CachedIO {
                metadata: self.output_quant.metadata(),
                len: out.len(),
                value: (!metadata_only).then(|| out.detach()),
            });
        }
        if self.caching.cache_inference_quant_bias {
            self.cached_bias = Some(self.bias.detach());
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
