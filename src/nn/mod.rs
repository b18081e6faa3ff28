//! Quantization-aware layers and the module-tree contract

mod activation;
mod linear;
mod module;

pub use activation::QuantReLU;
pub use linear::QuantLinear;
pub use module::{
    for_each_module, try_for_each_module, CachedIO, CachingFlags, ExportState, QuantModule,
    Sequential,
};
