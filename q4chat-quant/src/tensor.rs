use crate::error::{CodecError, Result};

/// Parameters for symmetric 4-bit group-wise quantization.
///
/// The quantized range is fixed at signed 4-bit ([-8, 7]); only the group
/// size varies. Once a tensor has been quantized with a set of parameters
/// they are immutable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Q4Params {
    /// Number of consecutive elements sharing one scale factor.
    pub group_size: usize,
}

impl Q4Params {
    /// Smallest representable quantized value.
    pub const QMIN: i8 = -8;
    /// Largest representable quantized value.
    pub const QMAX: i8 = 7;
    /// Floor applied to group scales to avoid division by zero.
    pub const SCALE_EPSILON: f32 = 1e-6;

    pub fn new(group_size: usize) -> Result<Self> {
        let params = Self { group_size };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(CodecError::InvalidConfiguration(
                "group_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Q4Params {
    fn default() -> Self {
        // Group size the conversion pipeline uses unless told otherwise.
        Self { group_size: 128 }
    }
}

/// A weight matrix compressed to packed signed 4-bit values.
///
/// Two values share each byte (low nibble = even index, high nibble = odd
/// index). Each contiguous group of `params.group_size` elements carries one
/// positive scale and one zero-point; zero-points are always 0.0 because the
/// quantization is symmetric, but they are stored and persisted so the
/// container stays self-describing.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub params: Q4Params,
    pub packed: Vec<u8>,
    pub scales: Vec<f32>,
    pub zeros: Vec<f32>,
    pub rows: usize,
    pub cols: usize,
    pub bias: Option<Vec<f32>>,
}

impl QuantizedTensor {
    /// Number of weight elements in the original matrix.
    pub fn element_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of quantization groups (the last group may be shorter).
    pub fn group_count(&self) -> usize {
        self.element_count().div_ceil(self.params.group_size)
    }

    /// Expected packed buffer length in bytes.
    pub fn packed_len(&self) -> usize {
        self.element_count().div_ceil(2)
    }

    /// Checks the buffer-length invariants against the declared shape.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;

        if self.packed.len() != self.packed_len() {
            return Err(CodecError::CorruptData(format!(
                "packed buffer holds {} bytes, expected {} for a {}x{} matrix",
                self.packed.len(),
                self.packed_len(),
                self.rows,
                self.cols
            )));
        }

        let groups = self.group_count();
        if self.scales.len() != groups {
            return Err(CodecError::CorruptData(format!(
                "scale array holds {} entries, expected {}",
                self.scales.len(),
                groups
            )));
        }
        if self.zeros.len() != groups {
            return Err(CodecError::CorruptData(format!(
                "zero-point array holds {} entries, expected {}",
                self.zeros.len(),
                groups
            )));
        }

        if let Some(bias) = &self.bias {
            if bias.len() != self.rows {
                return Err(CodecError::CorruptData(format!(
                    "bias holds {} entries, expected {} (one per output row)",
                    bias.len(),
                    self.rows
                )));
            }
        }

        Ok(())
    }
}
