#[cfg(test)]
#[path = "../tests/unit/container_test.rs"]
mod container_test;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{CodecError, Result};
use crate::tensor::{Q4Params, QuantizedTensor};

/// Magic number identifying a quantized tensor record ("q4w1" in ASCII).
const TENSOR_MAGIC: u32 = 0x71347731;

/// Persists one quantized tensor as a self-describing record.
///
/// Layout (all integers little-endian u32 unless noted): magic, group_size,
/// qmin (i32), qmax (i32), rows, cols, packed length, group count, bias
/// length (0 = none), then the packed bytes, the scale array, the zero-point
/// array and the optional bias (f32 each).
pub fn write_tensor<W: Write>(tensor: &QuantizedTensor, writer: &mut W) -> Result<()> {
    tensor.validate()?;

    writer.write_u32::<LittleEndian>(TENSOR_MAGIC)?;
    writer.write_u32::<LittleEndian>(tensor.params.group_size as u32)?;
    writer.write_i32::<LittleEndian>(i32::from(Q4Params::QMIN))?;
    writer.write_i32::<LittleEndian>(i32::from(Q4Params::QMAX))?;
    writer.write_u32::<LittleEndian>(tensor.rows as u32)?;
    writer.write_u32::<LittleEndian>(tensor.cols as u32)?;
    writer.write_u32::<LittleEndian>(tensor.packed.len() as u32)?;
    writer.write_u32::<LittleEndian>(tensor.scales.len() as u32)?;
    writer.write_u32::<LittleEndian>(tensor.bias.as_ref().map_or(0, Vec::len) as u32)?;

    writer.write_all(&tensor.packed)?;
    for &scale in &tensor.scales {
        writer.write_f32::<LittleEndian>(scale)?;
    }
    for &zero in &tensor.zeros {
        writer.write_f32::<LittleEndian>(zero)?;
    }
    if let Some(bias) = &tensor.bias {
        for &value in bias {
            writer.write_f32::<LittleEndian>(value)?;
        }
    }

    Ok(())
}

/// Reads one tensor record, rejecting any payload whose declared lengths
/// disagree with the shape before the buffers are used.
pub fn read_tensor<R: Read>(reader: &mut R) -> Result<QuantizedTensor> {
    let magic = read_u32(reader, "magic")?;
    if magic != TENSOR_MAGIC {
        return Err(CodecError::FormatError(format!(
            "bad tensor magic: expected {TENSOR_MAGIC:#x}, got {magic:#x}"
        )));
    }

    let group_size = read_u32(reader, "group size")? as usize;
    let params = Q4Params::new(group_size)
        .map_err(|e| CodecError::FormatError(e.to_string()))?;

    let qmin = read_i32(reader, "qmin")?;
    let qmax = read_i32(reader, "qmax")?;
    if qmin != i32::from(Q4Params::QMIN) || qmax != i32::from(Q4Params::QMAX) {
        return Err(CodecError::FormatError(format!(
            "unsupported quantized range [{qmin}, {qmax}]"
        )));
    }

    let rows = read_u32(reader, "rows")? as usize;
    let cols = read_u32(reader, "cols")? as usize;
    let packed_len = read_u32(reader, "packed length")? as usize;
    let group_count = read_u32(reader, "group count")? as usize;
    let bias_len = read_u32(reader, "bias length")? as usize;

    let element_count = rows * cols;
    if packed_len != element_count.div_ceil(2) {
        return Err(CodecError::FormatError(format!(
            "packed length {packed_len} inconsistent with {rows}x{cols} shape"
        )));
    }
    if group_count != element_count.div_ceil(group_size) {
        return Err(CodecError::FormatError(format!(
            "group count {group_count} inconsistent with {element_count} elements in groups of {group_size}"
        )));
    }
    if bias_len != 0 && bias_len != rows {
        return Err(CodecError::FormatError(format!(
            "bias length {bias_len} does not match {rows} output rows"
        )));
    }

    let mut packed = vec![0u8; packed_len];
    reader
        .read_exact(&mut packed)
        .map_err(|_| CodecError::FormatError("truncated packed buffer".to_string()))?;

    let scales = read_f32_array(reader, group_count, "scale array")?;
    let zeros = read_f32_array(reader, group_count, "zero-point array")?;
    let bias = if bias_len > 0 {
        Some(read_f32_array(reader, bias_len, "bias")?)
    } else {
        None
    };

    Ok(QuantizedTensor {
        params,
        packed,
        scales,
        zeros,
        rows,
        cols,
        bias,
    })
}

fn read_u32<R: Read>(reader: &mut R, field: &str) -> Result<u32> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(|_| CodecError::FormatError(format!("missing {field} field")))
}

fn read_i32<R: Read>(reader: &mut R, field: &str) -> Result<i32> {
    reader
        .read_i32::<LittleEndian>()
        .map_err(|_| CodecError::FormatError(format!("missing {field} field")))
}

fn read_f32_array<R: Read>(reader: &mut R, count: usize, field: &str) -> Result<Vec<f32>> {
    (0..count)
        .map(|_| {
            reader
                .read_f32::<LittleEndian>()
                .map_err(|_| CodecError::FormatError(format!("truncated {field}")))
        })
        .collect()
}
