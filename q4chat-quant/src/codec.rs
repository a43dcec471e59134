#[cfg(test)]
#[path = "../tests/unit/codec_test.rs"]
mod codec_test;

use rayon::prelude::*;

use crate::error::{CodecError, Result};
use crate::tensor::{Q4Params, QuantizedTensor};

/// Quantizes a dense weight matrix to packed symmetric 4-bit values.
///
/// The matrix is flattened row-major and split into contiguous groups of
/// `params.group_size` elements; the last group may be shorter and groups may
/// straddle row boundaries. Per group: `scale = max(abs(group)) / 7`, floored
/// at [`Q4Params::SCALE_EPSILON`]; each value is scaled onto the quantized
/// grid, rounded half-to-even and clamped to [-8, 7]. Zero-points are
/// always 0.
pub fn quantize(weights: &[f32], rows: usize, cols: usize, params: Q4Params) -> Result<QuantizedTensor> {
    params.validate()?;

    if weights.len() != rows * cols {
        return Err(CodecError::CorruptData(format!(
            "weight buffer holds {} elements, expected {} for a {rows}x{cols} matrix",
            weights.len(),
            rows * cols
        )));
    }

    let qmax = f32::from(Q4Params::QMAX);
    let group_results: Vec<(Vec<i8>, f32)> = weights
        .par_chunks(params.group_size)
        .map(|group| {
            let group_max = group.iter().map(|&w| w.abs()).fold(0.0f32, f32::max);
            let scale = (group_max / qmax).max(Q4Params::SCALE_EPSILON);

            let quantized = group
                .iter()
                .map(|&w| {
                    // Ratio against the group maximum, so max(|group|) lands
                    // exactly on ±qmax; the floored scale only applies to
                    // near-zero groups.
                    let scaled = if scale > Q4Params::SCALE_EPSILON {
                        w * qmax / group_max
                    } else {
                        w / scale
                    };
                    round_half_to_even(scaled).clamp(f32::from(Q4Params::QMIN), qmax) as i8
                })
                .collect();

            (quantized, scale)
        })
        .collect();

    let mut values = Vec::with_capacity(weights.len());
    let mut scales = Vec::with_capacity(group_results.len());
    for (group_values, scale) in group_results {
        values.extend(group_values);
        scales.push(scale);
    }

    let zeros = vec![0.0; scales.len()];

    Ok(QuantizedTensor {
        params,
        packed: pack(&values),
        scales,
        zeros,
        rows,
        cols,
        bias: None,
    })
}

/// Reconstructs the approximate dense matrix from a quantized tensor.
///
/// Validates the buffer-length invariants first, then unpacks nibbles back to
/// signed integers, drops the packing pad, and applies `q * scale + zero` per
/// group. The result is the row-major `rows * cols` matrix.
pub fn dequantize(tensor: &QuantizedTensor) -> Result<Vec<f32>> {
    tensor.validate()?;

    let values = unpack(&tensor.packed, tensor.element_count());
    let group_size = tensor.params.group_size;

    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &q)| {
            let group = i / group_size;
            f32::from(q) * tensor.scales[group] + tensor.zeros[group]
        })
        .collect())
}

/// Packs signed 4-bit values two per byte: low nibble = even index, high
/// nibble = odd index, each masked to 4 bits. An odd-length input is padded
/// with one implicit zero value.
///
/// Packing is lossless; only the rounding in [`quantize`] loses information.
pub fn pack(values: &[i8]) -> Vec<u8> {
    values
        .chunks(2)
        .map(|pair| {
            let low = (pair[0] as u8) & 0x0F;
            let high = (pair.get(1).copied().unwrap_or(0) as u8) & 0x0F;
            low | (high << 4)
        })
        .collect()
}

/// Unpacks `count` signed 4-bit values from packed bytes, low nibble first.
///
/// The sign is recovered with a mask-and-offset (`(n ^ 8) - 8`) rather than a
/// two's-complement cast, so every nibble maps exactly back onto [-8, 7].
pub fn unpack(bytes: &[u8], count: usize) -> Vec<i8> {
    debug_assert!(count <= bytes.len() * 2, "count exceeds packed capacity");

    bytes
        .iter()
        .flat_map(|&byte| [byte & 0x0F, (byte >> 4) & 0x0F])
        .take(count)
        .map(|nibble| ((nibble ^ 0x08) as i8) - 8)
        .collect()
}

/// Round half to even (banker's rounding) to match PyTorch's torch.round
/// behavior on the checkpoints being converted.
#[inline]
fn round_half_to_even(x: f32) -> f32 {
    let rounded = x.round();
    let diff = (x - rounded).abs();

    // If not exactly halfway, use standard rounding
    if diff != 0.5 {
        return rounded;
    }

    if rounded as i32 % 2 == 0 {
        rounded
    } else if x >= 0.0 {
        rounded - 1.0
    } else {
        rounded + 1.0
    }
}
