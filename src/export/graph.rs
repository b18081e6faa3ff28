//! Traced-graph data structures

use crate::quant::QuantMetadata;
use serde::{Deserialize, Serialize};

/// One recorded layer in a traced graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    /// Concrete layer name
    pub layer: String,
    /// Input element count observed during the recording pass
    pub input_len: Option<usize>,
    /// Output element count observed during the recording pass
    pub output_len: Option<usize>,
    /// Weight quantization metadata, when the layer has a weight
    pub weight: Option<QuantMetadata>,
    /// Input quantization metadata, from the caching-primed pass
    pub input: Option<QuantMetadata>,
    /// Output quantization metadata, from the caching-primed pass
    pub output: Option<QuantMetadata>,
}

impl TraceNode {
    /// An empty node for the given layer name
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            input_len: None,
            output_len: None,
            weight: None,
            input: None,
            output: None,
        }
    }
}

/// A serializable recording of one forward pass through a module tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracedGraph {
    /// Element count of the placeholder input
    pub input_len: usize,
    /// Element count of the traced output
    pub output_len: usize,
    /// Recorded nodes in module pre-order
    pub nodes: Vec<TraceNode>,
}

impl TracedGraph {
    /// Serialize the graph to JSON
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::Serialization(format!("trace serialization failed: {e}")))
    }
}
