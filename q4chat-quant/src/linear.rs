#[cfg(test)]
#[path = "../tests/unit/linear_test.rs"]
mod linear_test;

use rayon::prelude::*;
use std::io::{Read, Write};

use crate::codec::{dequantize, quantize};
use crate::container;
use crate::error::Result;
use crate::tensor::{Q4Params, QuantizedTensor};

/// Affine transform `y = x * W^T + b` backed by 4-bit quantized weights.
///
/// The weight matrix is stored packed and reconstructed on every forward
/// call; nothing is cached. Recomputation keeps the resident footprint at the
/// packed size, which is the point of quantizing in the first place.
#[derive(Debug, Clone)]
pub struct QuantizedLinear {
    weight: QuantizedTensor,
}

impl QuantizedLinear {
    /// Quantizes an existing dense layer into this representation.
    ///
    /// `weights` is the row-major `[out_features, in_features]` matrix of the
    /// dense layer; `bias`, when present, has one entry per output feature.
    pub fn from_dense(
        weights: &[f32],
        bias: Option<Vec<f32>>,
        out_features: usize,
        in_features: usize,
        params: Q4Params,
    ) -> Result<Self> {
        let mut weight = quantize(weights, out_features, in_features, params)?;
        weight.bias = bias;
        weight.validate()?;
        Ok(Self { weight })
    }

    /// Wraps an already-quantized tensor, e.g. one read from a container.
    pub fn from_tensor(weight: QuantizedTensor) -> Result<Self> {
        weight.validate()?;
        Ok(Self { weight })
    }

    pub fn in_features(&self) -> usize {
        self.weight.cols
    }

    pub fn out_features(&self) -> usize {
        self.weight.rows
    }

    /// Applies the affine transform to one input vector.
    ///
    /// Dequantizes the full weight matrix, then computes each output row as a
    /// dot product in parallel.
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        assert_eq!(
            input.len(),
            self.weight.cols,
            "input length must match in_features: {} != {}",
            input.len(),
            self.weight.cols
        );

        let dense = dequantize(&self.weight)?;
        let cols = self.weight.cols;

        let mut output = vec![0.0f32; self.weight.rows];
        output
            .par_iter_mut()
            .enumerate()
            .for_each(|(row, out_val)| {
                let row_offset = row * cols;
                *out_val = dense[row_offset..row_offset + cols]
                    .iter()
                    .zip(input)
                    .map(|(&w, &x)| w * x)
                    .sum();
            });

        if let Some(bias) = &self.weight.bias {
            for (out_val, &b) in output.iter_mut().zip(bias) {
                *out_val += b;
            }
        }

        Ok(output)
    }

    /// Persists the layer so it can be reloaded without requantization.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        container::write_tensor(&self.weight, writer)
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        Self::from_tensor(container::read_tensor(reader)?)
    }
}
