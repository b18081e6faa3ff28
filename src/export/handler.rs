//! Export handlers and their registry entries
//!
//! A handler is a per-layer-type strategy that collects whatever a
//! downstream serializer needs for that layer: quantization metadata from
//! the caching-primed pass, and observed shapes from the recording pass.

use super::graph::TraceNode;
use crate::autograd::Tensor;
use crate::nn::{QuantLinear, QuantModule, QuantReLU};
use crate::{Error, Result};

/// Per-layer-type export recording strategy
pub trait ExportHandler {
    /// Read cached quantization metadata off the module after the priming pass
    fn prepare(&mut self, module: &dyn QuantModule) -> Result<()>;

    /// Observe one export-mode forward pass
    fn record(&mut self, input: &Tensor, output: &Tensor);

    /// The node this handler contributes to the traced graph
    fn node(&self) -> TraceNode;
}

/// A registry entry: a type predicate paired with a handler factory
///
/// Entries are evaluated in registration order and the first match wins.
pub struct HandlerRegistration {
    /// Whether this entry handles the given module
    pub matches: fn(&dyn QuantModule) -> bool,
    /// Build a fresh handler instance for a matched module
    pub build: fn() -> Box<dyn ExportHandler>,
}

/// Handler for [`QuantLinear`] layers
#[derive(Default)]
pub struct QuantLinearHandler {
    weight: Option<crate::quant::QuantMetadata>,
    input: Option<crate::quant::QuantMetadata>,
    output: Option<crate::quant::QuantMetadata>,
    input_len: Option<usize>,
    output_len: Option<usize>,
}

impl QuantLinearHandler {
    pub fn registration() -> HandlerRegistration {
        HandlerRegistration {
            matches: |m| m.as_any().is::<QuantLinear>(),
            build: || Box::new(QuantLinearHandler::default()),
        }
    }
}

impl ExportHandler for QuantLinearHandler {
    fn prepare(&mut self, module: &dyn QuantModule) -> Result<()> {
        let linear = module
            .as_any()
            .downcast_ref::<QuantLinear>()
            .ok_or_else(|| Error::Export { module: module.layer_name().to_string() })?;

        self.weight = Some(linear.weight_quant().metadata());
        self.input = linear.cached_inp().map(|c| c.metadata.clone());
        self.output = linear.cached_out().map(|c| c.metadata.clone());
        Ok(())
    }

    fn record(&mut self, input: &Tensor, output: &Tensor) {
        self.input_len = Some(input.len());
        self.output_len = Some(output.len());
    }

    fn node(&self) -> TraceNode {
        TraceNode {
            layer: "QuantLinear".to_string(),
            input_len: self.input_len,
            output_len: self.output_len,
            weight: self.weight.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }
}

/// Handler for [`QuantReLU`] layers
#[derive(Default)]
pub struct QuantReLUHandler {
    output: Option<crate::quant::QuantMetadata>,
    input_len: Option<usize>,
    output_len: Option<usize>,
}

impl QuantReLUHandler {
    pub fn registration() -> HandlerRegistration {
        HandlerRegistration {
            matches: |m| m.as_any().is::<QuantReLU>(),
            build: || Box::new(QuantReLUHandler::default()),
        }
    }
}

impl ExportHandler for QuantReLUHandler {
    fn prepare(&mut self, module: &dyn QuantModule) -> Result<()> {
        let relu = module
            .as_any()
            .downcast_ref::<QuantReLU>()
            .ok_or_else(|| Error::Export { module: module.layer_name().to_string() })?;

        self.output = relu.cached_out().map(|c| c.metadata.clone());
        Ok(())
    }

    fn record(&mut self, input: &Tensor, output: &Tensor) {
        self.input_len = Some(input.len());
        self.output_len = Some(output.len());
    }

    fn node(&self) -> TraceNode {
        TraceNode {
            layer: "QuantReLU".to_string(),
            input_len: self.input_len,
            output_len: self.output_len,
            weight: None,
            input: None,
            output: self.output.clone(),
        }
    }
}
