//! Module-tree contract for quantization-aware layers
//!
//! Layers implement [`QuantModule`]; containers expose their children so the
//! export controller can traverse the tree recursively. Capability accessors
//! return `None` for modules that do not carry caching flags or export
//! state, and the controller treats absence as a no-op.

use crate::autograd::Tensor;
use crate::export::ExportHandler;
use crate::quant::QuantMetadata;
use crate::Result;
use std::any::Any;

/// Per-module caching flags with typed backup slots
///
/// Each flag carries its own `Option<bool>` backup. A present backup means a
/// snapshot is alive and a second override is skipped; the presence of the
/// backup is the re-entrancy guard, so override/restore pairs compose into
/// an exact undo.
#[derive(Default)]
pub struct CachingFlags {
    /// Keep only scale/zero-point/bit-width metadata, not full tensors
    pub cache_quant_io_metadata_only: bool,
    /// Retain the quantized bias representation after a forward pass
    pub cache_inference_quant_bias: bool,
    /// Retain the quantized input representation after a forward pass
    pub cache_inference_quant_inp: bool,
    /// Retain the quantized output representation after a forward pass
    pub cache_inference_quant_out: bool,
    backup_metadata_only: Option<bool>,
    backup_bias: Option<bool>,
    backup_inp: Option<bool>,
    backup_out: Option<bool>,
}

impl CachingFlags {
    pub fn new() -> Self {
        Self {
            // Metadata-only caching is the cheap mode and the default.
            cache_quant_io_metadata_only: true,
            ..Self::default()
        }
    }

    /// Snapshot and force the metadata-only flag; no-op when a backup is alive
    pub fn override_metadata_only(&mut self, enabled: bool) {
        if self.backup_metadata_only.is_none() {
            self.backup_metadata_only = Some(self.cache_quant_io_metadata_only);
            self.cache_quant_io_metadata_only = enabled;
        }
    }

    /// Snapshot and force the bias flag; no-op when a backup is alive
    pub fn override_bias(&mut self, enabled: bool) {
        if self.backup_bias.is_none() {
            self.backup_bias = Some(self.cache_inference_quant_bias);
            self.cache_inference_quant_bias = enabled;
        }
    }

    /// Snapshot and force the input flag; no-op when a backup is alive
    pub fn override_inp(&mut self, enabled: bool) {
        if self.backup_inp.is_none() {
            self.backup_inp = Some(self.cache_inference_quant_inp);
            self.cache_inference_quant_inp = enabled;
        }
    }

    /// Snapshot and force the output flag; no-op when a backup is alive
    pub fn override_out(&mut self, enabled: bool) {
        if self.backup_out.is_none() {
            self.backup_out = Some(self.cache_inference_quant_out);
            self.cache_inference_quant_out = enabled;
        }
    }

    /// Snapshot and force all four flags
    pub fn override_all(&mut self, enabled: bool) {
        self.override_metadata_only(enabled);
        self.override_bias(enabled);
        self.override_inp(enabled);
        self.override_out(enabled);
    }

    /// Restore a flag from its backup and drop the backup; no-op without one
    pub fn restore_metadata_only(&mut self) {
        if let Some(prev) = self.backup_metadata_only.take() {
            self.cache_quant_io_metadata_only = prev;
        }
    }

    pub fn restore_bias(&mut self) {
        if let Some(prev) = self.backup_bias.take() {
            self.cache_inference_quant_bias = prev;
        }
    }

    pub fn restore_inp(&mut self) {
        if let Some(prev) = self.backup_inp.take() {
            self.cache_inference_quant_inp = prev;
        }
    }

    pub fn restore_out(&mut self) {
        if let Some(prev) = self.backup_out.take() {
            self.cache_inference_quant_out = prev;
        }
    }

    /// Restore all four flags from their backups
    pub fn restore_all(&mut self) {
        self.restore_metadata_only();
        self.restore_bias();
        self.restore_inp();
        self.restore_out();
    }

    /// Whether any backup is currently alive
    pub fn has_backup(&self) -> bool {
        self.backup_metadata_only.is_some()
            || self.backup_bias.is_some()
            || self.backup_inp.is_some()
            || self.backup_out.is_some()
    }
}

/// Per-module export state: recording mode and the attached handler
#[derive(Default)]
pub struct ExportState {
    /// When true, forward passes record into the attached handler
    pub export_mode: bool,
    /// Handler installed by the export manager's assignment pass
    pub handler: Option<Box<dyn ExportHandler>>,
}

/// A cached input/output representation from a caching-primed forward pass
#[derive(Clone)]
pub struct CachedIO {
    /// Quantization metadata of the representation
    pub metadata: QuantMetadata,
    /// Element count of the representation
    pub len: usize,
    /// Full values; only kept when metadata-only caching is off
    pub value: Option<Tensor>,
}

/// A layer participating in quantization-aware forward passes and export
pub trait QuantModule {
    /// Concrete layer name, used by handler matching errors and trace nodes
    fn layer_name(&self) -> &'static str;

    /// Run the layer on a 1-D input
    fn forward(&mut self, input: &Tensor) -> Tensor;

    /// Direct children, for recursive traversal
    fn children_mut(&mut self) -> Vec<&mut (dyn QuantModule + '_)> {
        Vec::new()
    }

    /// Caching flags, for modules that cache quantization metadata
    fn caching_flags_mut(&mut self) -> Option<&mut CachingFlags> {
        None
    }

    /// Export state, for modules that can record into a handler
    fn export_mut(&mut self) -> Option<&mut ExportState> {
        None
    }

    /// Whether export must fail if no handler matches this module
    fn requires_export_handler(&self) -> bool {
        false
    }

    /// Downcast support for handler matching
    fn as_any(&self) -> &dyn Any;
}

/// Apply `f` to `root` and every descendant, pre-order
pub fn for_each_module(root: &mut dyn QuantModule, f: &mut dyn FnMut(&mut dyn QuantModule)) {
    f(root);
    for child in root.children_mut() {
        for_each_module(child, f);
    }
}

/// Fallible pre-order traversal; stops at the first error
pub fn try_for_each_module(
    root: &mut dyn QuantModule,
    f: &mut dyn FnMut(&mut dyn QuantModule) -> Result<()>,
) -> Result<()> {
    f(root)?;
    for child in root.children_mut() {
        try_for_each_module(child, f)?;
    }
    Ok(())
}

/// Run layers in order, feeding each output into the next
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn QuantModule>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Append a layer, builder-style
    pub fn push(mut self, layer: Box<dyn QuantModule>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl QuantModule for Sequential {
    fn layer_name(&self) -> &'static str {
        "Sequential"
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current);
        }
        current
    }

    fn children_mut(&mut self) -> Vec<&mut (dyn QuantModule + '_)> {
        self.layers
            .iter_mut()
            .map(|l| -> &mut (dyn QuantModule + '_) { l.as_mut() })
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_snapshots_and_forces() {
        let mut flags = CachingFlags::default();
        flags.cache_inference_quant_inp = false;

        flags.override_all(true);
        assert!(flags.cache_inference_quant_inp);
        assert!(flags.has_backup());

        flags.restore_all();
        assert!(!flags.cache_inference_quant_inp);
        assert!(!flags.has_backup());
    }

    #[test]
    fn test_second_override_is_skipped() {
        let mut flags = CachingFlags::default();
        flags.cache_inference_quant_out = true;

        flags.override_out(false);
        // Nested override must not clobber the original backup.
        flags.override_out(true);
        assert!(!flags.cache_inference_quant_out, "second override skipped");

        flags.restore_out();
        assert!(flags.cache_inference_quant_out, "original value restored");
    }

    #[test]
    fn test_restore_without_backup_is_noop() {
        let mut flags = CachingFlags::new();
        assert!(flags.cache_quant_io_metadata_only);
        flags.restore_all();
        assert!(flags.cache_quant_io_metadata_only);
    }

    #[test]
    fn test_new_defaults_to_metadata_only() {
        let flags = CachingFlags::new();
        assert!(flags.cache_quant_io_metadata_only);
        assert!(!flags.cache_inference_quant_bias);
        assert!(!flags.cache_inference_quant_inp);
        assert!(!flags.cache_inference_quant_out);
    }
}
