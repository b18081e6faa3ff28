//! Export pipeline: handler dispatch, caching-primed capture, trace recording

mod graph;
mod handler;
mod manager;


pub use graph::{TraceNode, TracedGraph};
pub use handler::{ExportHandler, HandlerRegistration, QuantLinearHandler, QuantReLUHandler};
pub use manager::{ExportInput, ExportManager};
