#[cfg(test)]
#[path = "../tests/unit/model_exporter_test.rs"]
mod model_exporter_test;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::codec::{dequantize, quantize};
use crate::config_loader::{ExportConfig, load_export_config};
use crate::container;
use crate::tensor::Q4Params;
use crate::tensor_reader::TensorReader;

/// Magic number identifying a quantized model file ("q4m1" in ASCII).
pub const MODEL_MAGIC: u32 = 0x71346D31;
/// Model file format version.
pub const MODEL_VERSION: i32 = 1;
/// Size of the fixed model header in bytes.
pub const MODEL_HEADER_SIZE: usize = 64;

/// End-of-sequence token id of the byte-level vocabulary.
pub const EOS_TOKEN_ID: usize = 256;
/// Byte-level vocabulary size: 256 single-byte tokens plus the eos marker.
pub const VOCAB_SIZE: usize = 257;

const EOS_TOKEN_TEXT: &[u8] = b"<|endoftext|>";

/// Converts a dense SafeTensors checkpoint into the packed 4-bit model file.
///
/// The output holds the header, the byte-level tokenizer vocabulary, the
/// embedding table in fp32 (it is a lookup, not a matmul operand) and one
/// container record per linear layer, quantized in groups of `group_size`.
pub fn export_model(model_dir: &Path, output_path: &Path, group_size: usize) -> Result<()> {
    let params = Q4Params::new(group_size)?;
    let config = load_export_config(model_dir)?;
    let reader = TensorReader::new(model_dir)?;

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write_header(&mut writer, &config, group_size)?;
    write_tokenizer_section(&mut writer)?;
    write_embedding(&mut writer, &reader, &config)?;

    let mut max_error = 0.0f32;
    let mut exported = 0usize;
    for layer_idx in 0..config.n_layers {
        let fc = format!("layers.{layer_idx}.fc");
        let proj = format!("layers.{layer_idx}.proj");
        max_error = max_error.max(export_linear(
            &mut writer,
            &reader,
            &fc,
            config.hidden_dim,
            config.dim,
            params,
        )?);
        max_error = max_error.max(export_linear(
            &mut writer,
            &reader,
            &proj,
            config.dim,
            config.hidden_dim,
            params,
        )?);
        exported += 2;
    }

    max_error = max_error.max(export_linear(
        &mut writer,
        &reader,
        "lm_head",
        VOCAB_SIZE,
        config.dim,
        params,
    )?);
    exported += 1;

    writer.flush()?;
    info!("Quantized {exported} weight tensors to Q4 with max error: {max_error:.8}");
    info!("💾 Written model checkpoint to {}", output_path.display());

    Ok(())
}

/// The byte-level vocabulary shared by the exporter and the inference side.
pub fn byte_vocab() -> Vec<Vec<u8>> {
    let mut vocab: Vec<Vec<u8>> = (0u8..=255).map(|b| vec![b]).collect();
    vocab.push(EOS_TOKEN_TEXT.to_vec());
    vocab
}

fn write_header<W: Write>(writer: &mut W, config: &ExportConfig, group_size: usize) -> Result<()> {
    writer.write_u32::<LittleEndian>(MODEL_MAGIC)?;
    writer.write_i32::<LittleEndian>(MODEL_VERSION)?;
    writer.write_u32::<LittleEndian>(VOCAB_SIZE as u32)?;
    writer.write_u32::<LittleEndian>(config.dim as u32)?;
    writer.write_u32::<LittleEndian>(config.hidden_dim as u32)?;
    writer.write_u32::<LittleEndian>(config.n_layers as u32)?;
    writer.write_u32::<LittleEndian>(EOS_TOKEN_ID as u32)?;
    writer.write_u32::<LittleEndian>(group_size as u32)?;

    // Pad to header size
    let written = 4 + 4 + 6 * 4;
    writer.write_all(&vec![0u8; MODEL_HEADER_SIZE - written])?;

    Ok(())
}

fn write_tokenizer_section<W: Write>(writer: &mut W) -> Result<()> {
    let vocab = byte_vocab();
    writer.write_u32::<LittleEndian>(vocab.len() as u32)?;
    for token in &vocab {
        writer.write_u32::<LittleEndian>(token.len() as u32)?;
        writer.write_all(token)?;
    }
    Ok(())
}

fn write_embedding<W: Write>(writer: &mut W, reader: &TensorReader, config: &ExportConfig) -> Result<()> {
    let (data, shape) = reader
        .load_tensor("embedding.weight")?
        .context("Missing weight tensor: embedding.weight")?;

    if shape != [VOCAB_SIZE, config.dim] {
        anyhow::bail!(
            "embedding.weight has shape {shape:?}, expected [{VOCAB_SIZE}, {}]",
            config.dim
        );
    }

    for &value in &data {
        writer.write_f32::<LittleEndian>(value)?;
    }
    Ok(())
}

/// Quantizes one `[out_features, in_features]` layer (optional bias) and
/// writes it as a container record, returning its max reconstruction error.
fn export_linear<W: Write>(
    writer: &mut W,
    reader: &TensorReader,
    name: &str,
    out_features: usize,
    in_features: usize,
    params: Q4Params,
) -> Result<f32> {
    let weight_name = format!("{name}.weight");
    let (weights, shape) = reader
        .load_tensor(&weight_name)?
        .with_context(|| format!("Missing weight tensor: {weight_name}"))?;

    if shape != [out_features, in_features] {
        anyhow::bail!("{weight_name} has shape {shape:?}, expected [{out_features}, {in_features}]");
    }

    let mut tensor = quantize(&weights, out_features, in_features, params)?;

    let bias_name = format!("{name}.bias");
    if let Some((bias, bias_shape)) = reader.load_tensor(&bias_name)? {
        if bias_shape != [out_features] {
            anyhow::bail!("{bias_name} has shape {bias_shape:?}, expected [{out_features}]");
        }
        tensor.bias = Some(bias);
    }

    let reconstructed = dequantize(&tensor)?;
    let max_error = weights
        .iter()
        .zip(&reconstructed)
        .map(|(&w, &r)| (w - r).abs())
        .fold(0.0f32, f32::max);

    info!("Quantizing {weight_name} [{out_features}x{in_features}], max error {max_error:.8}");
    container::write_tensor(&tensor, writer)?;

    Ok(max_error)
}
