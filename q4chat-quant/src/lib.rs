//! # q4chat-quant
//!
//! 4-bit symmetric group-wise weight quantization: the codec, a drop-in
//! quantized linear layer, a self-describing persistence format and the
//! dense-checkpoint conversion pipeline.
//!
//! ## Examples
//!
//! ### Quantizing a weight matrix
//!
//! ```rust
//! use q4chat_quant::{Q4Params, codec};
//!
//! # fn main() -> Result<(), q4chat_quant::CodecError> {
//! let weights = vec![1.0, -1.0, 2.0, -2.0];
//! let tensor = codec::quantize(&weights, 1, 4, Q4Params::new(4)?)?;
//! let approx = codec::dequantize(&tensor)?;
//! assert!((approx[2] - 2.0).abs() < 1e-6);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config_loader;
pub mod container;
mod error;
mod linear;
pub mod model_exporter;
mod tensor;
mod tensor_reader;

pub use config_loader::{ExportConfig, load_export_config};
pub use error::CodecError;
pub use linear::QuantizedLinear;
pub use model_exporter::{EOS_TOKEN_ID, MODEL_HEADER_SIZE, MODEL_MAGIC, MODEL_VERSION, VOCAB_SIZE, export_model};
pub use tensor::{Q4Params, QuantizedTensor};
