use thiserror::Error;

/// Errors produced by the quantization codec and its persistence layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed quantization parameters, e.g. a zero group size.
    #[error("invalid quantization configuration: {0}")]
    InvalidConfiguration(String),

    /// A tensor's buffers disagree with its declared shape.
    #[error("corrupt quantized data: {0}")]
    CorruptData(String),

    /// A persisted container is malformed or size-inconsistent.
    #[error("malformed tensor container: {0}")]
    FormatError(String),

    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
