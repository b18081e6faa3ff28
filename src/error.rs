//! Crate-wide error types

use thiserror::Error;

/// Errors raised by quantization primitives and the export pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction-time configuration (bad bit-width bounds etc.)
    #[error("configuration error: {0}")]
    Config(String),

    /// A module requiring export support has no matching registered handler
    #[error("module {module} not supported for export")]
    Export { module: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
