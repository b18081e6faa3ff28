//! Export manager: caching-primed metadata capture and trace recording
//!
//! The export protocol is a fixed sequence over one module tree:
//! handler assignment, a caching-primed forward pass with exact flag
//! restore, then a recording forward pass over a plain placeholder input
//! with `export_mode` raised and lowered around it. A module requiring a
//! handler with no registered match aborts the whole export before any
//! forward pass runs.
//!
//! The protocol mutates per-module flags and is not safe for concurrent
//! invocation on overlapping module trees; callers hold the
//! one-call-at-a-time contract.

use super::graph::{TraceNode, TracedGraph};
use super::handler::HandlerRegistration;
use crate::autograd::Tensor;
use crate::nn::{for_each_module, try_for_each_module, QuantModule};
use crate::quant::QuantTensor;
use crate::Result;
use tracing::debug;

/// Input accepted by the export entry point: plain or quantized
pub enum ExportInput {
    Plain(Tensor),
    Quant(QuantTensor),
}

impl ExportInput {
    /// Element count, regardless of wrapper
    pub fn len(&self) -> usize {
        match self {
            ExportInput::Plain(t) => t.len(),
            ExportInput::Quant(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The wrapped value
    fn value(&self) -> &Tensor {
        match self {
            ExportInput::Plain(t) => t,
            ExportInput::Quant(q) => &q.value,
        }
    }
}

/// Ordered handler registry and export protocol driver
#[derive(Default)]
pub struct ExportManager {
    handlers: Vec<HandlerRegistration>,
}

impl ExportManager {
    /// An empty registry
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Append a registration; earlier registrations win on overlap
    pub fn register(mut self, registration: HandlerRegistration) -> Self {
        self.handlers.push(registration);
        self
    }

    /// First registered entry matching the module, if any
    pub fn handler_from_module(&self, module: &dyn QuantModule) -> Option<&HandlerRegistration> {
        self.handlers.iter().find(|h| (h.matches)(module))
    }

    /// Install a handler on one module exposing an unset handler slot.
    ///
    /// Modules without export state are skipped; a module that requires a
    /// handler but matches no registration is a hard export error.
    pub fn set_export_handler(&self, module: &mut dyn QuantModule) -> Result<()> {
        let requires = module.requires_export_handler();
        let name = module.layer_name().to_string();

        let slot_unset = match module.export_mut() {
            Some(state) => state.handler.is_none(),
            None => return Ok(()),
        };
        if !slot_unset {
            return Ok(());
        }

        match self.handler_from_module(&*module) {
            Some(registration) => {
                let handler = (registration.build)();
                if let Some(state) = module.export_mut() {
                    state.handler = Some(handler);
                }
                Ok(())
            }
            None if requires => Err(crate::Error::Export { module: name }),
            None => Ok(()),
        }
    }

    /// Prime caching-aware submodules with one forward pass.
    ///
    /// Every caching flag is snapshotted and forced on, the forward runs so
    /// submodules store their quantization metadata as a side effect, then
    /// every flag is restored exactly, including for modules where a flag
    /// never existed (no-op).
    pub fn cache_inp_out(&self, module: &mut dyn QuantModule, input: &ExportInput) {
        for_each_module(module, &mut |m| {
            if let Some(flags) = m.caching_flags_mut() {
                flags.override_all(true);
            }
        });

        let _ = module.forward(input.value());

        for_each_module(module, &mut |m| {
            if let Some(flags) = m.caching_flags_mut() {
                flags.restore_all();
            }
        });
    }

    /// Trace one forward pass of the module tree into a serializable graph.
    ///
    /// The supplied input contributes only its shape to the recording pass:
    /// it is replaced by a freshly allocated plain zero tensor, discarding
    /// any quantization wrapper semantics.
    pub fn trace(&self, module: &mut dyn QuantModule, input: &ExportInput) -> Result<TracedGraph> {
        // Handler assignment runs before any forward pass so an unsupported
        // module aborts the export with nothing half-done.
        try_for_each_module(module, &mut |m| self.set_export_handler(m))?;

        debug!(input_len = input.len(), "priming quantization metadata caches");
        self.cache_inp_out(module, input);

        // Handlers read the cached metadata off their modules. The handler
        // is taken out of the module for the call so it can borrow the
        // module immutably, then put back.
        try_for_each_module(module, &mut |m| {
            let taken = m.export_mut().and_then(|state| state.handler.take());
            if let Some(mut handler) = taken {
                handler.prepare(&*m)?;
                if let Some(state) = m.export_mut() {
                    state.handler = Some(handler);
                }
            }
            Ok(())
        })?;

        let placeholder = Tensor::zeros(input.len(), false);

        for_each_module(module, &mut |m| {
            if let Some(state) = m.export_mut() {
                state.export_mode = true;
            }
        });

        let output = module.forward(&placeholder);

        let mut nodes: Vec<TraceNode> = Vec::new();
        for_each_module(module, &mut |m| {
            if let Some(state) = m.export_mut() {
                if let Some(handler) = &state.handler {
                    nodes.push(handler.node());
                }
            }
        });

        for_each_module(module, &mut |m| {
            if let Some(state) = m.export_mut() {
                state.export_mode = false;
            }
        });

        debug!(nodes = nodes.len(), "trace recorded");
        Ok(TracedGraph {
            input_len: input.len(),
            output_len: output.len(),
            nodes,
        })
    }
}
