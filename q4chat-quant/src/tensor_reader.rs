use anyhow::{Context, Result};
use log::info;
use memmap2::Mmap;
use safetensors::SafeTensors;
use std::{
    fs::File,
    mem,
    path::{Path, PathBuf},
};

/// Reads named tensors from the SafeTensors files of a dense checkpoint.
///
/// Files are memory-mapped on demand; BF16 and F32 payloads are converted to
/// f32 with their byte sizes validated against the declared shape.
#[derive(Debug)]
pub(crate) struct TensorReader {
    safetensors_files: Vec<PathBuf>,
}

impl TensorReader {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let safetensors_files = std::fs::read_dir(model_dir)
            .with_context(|| format!("Failed to read directory: {}", model_dir.display()))?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                matches!(path.extension(), Some(ext) if ext == "safetensors").then_some(path)
            })
            .collect::<Vec<_>>();

        if safetensors_files.is_empty() {
            anyhow::bail!("No SafeTensors files found in {}", model_dir.display());
        }

        info!("Found {} safetensor files", safetensors_files.len());

        Ok(Self { safetensors_files })
    }

    /// Loads a tensor by name together with its shape, searching every file.
    pub fn load_tensor(&self, tensor_name: &str) -> Result<Option<(Vec<f32>, Vec<usize>)>> {
        for filename in &self.safetensors_files {
            let file = File::open(filename)
                .with_context(|| format!("Failed to open {}", filename.display()))?;

            // SAFETY: the mapping is read-only and dropped before this call
            // returns; conversion checkpoints are not modified mid-read.
            let mmap = unsafe { Mmap::map(&file) }
                .with_context(|| format!("Failed to memory map {}", filename.display()))?;

            let safetensors = SafeTensors::deserialize(&mmap)
                .with_context(|| format!("Failed to deserialize {}", filename.display()))?;

            if let Ok(tensor_view) = safetensors.tensor(tensor_name) {
                let shape = tensor_view.shape().to_vec();
                let data = Self::convert_tensor_to_f32(&tensor_view, tensor_name)?;
                return Ok(Some((data, shape)));
            }
        }

        Ok(None)
    }

    /// Convert tensor data to f32 based on its data type
    fn convert_tensor_to_f32(
        tensor_view: &safetensors::tensor::TensorView,
        tensor_name: &str,
    ) -> Result<Vec<f32>> {
        let tensor_data = tensor_view.data();
        let expected_elements = tensor_view.shape().iter().product::<usize>();

        match tensor_view.dtype() {
            safetensors::Dtype::F32 => {
                Self::validate_tensor_size(
                    tensor_data.len(),
                    expected_elements * mem::size_of::<f32>(),
                    tensor_name,
                    "F32",
                )?;
                Ok(Self::convert_f32_data(tensor_data))
            }
            safetensors::Dtype::BF16 => {
                Self::validate_tensor_size(tensor_data.len(), expected_elements * 2, tensor_name, "BF16")?;
                Ok(Self::convert_bf16_data(tensor_data))
            }
            dtype => anyhow::bail!("Unsupported tensor dtype {:?} for {}", dtype, tensor_name),
        }
    }

    fn validate_tensor_size(
        actual_bytes: usize,
        expected_bytes: usize,
        tensor_name: &str,
        dtype_name: &str,
    ) -> Result<()> {
        if actual_bytes != expected_bytes {
            anyhow::bail!(
                "{} tensor {} size mismatch. Expected {} bytes, got {}",
                dtype_name,
                tensor_name,
                expected_bytes,
                actual_bytes
            );
        }
        Ok(())
    }

    fn convert_f32_data(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(mem::size_of::<f32>())
            .map(|chunk| {
                let bytes: [u8; 4] = chunk.try_into().expect("chunk size is guaranteed to be 4");
                f32::from_le_bytes(bytes)
            })
            .collect()
    }

    fn convert_bf16_data(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(2)
            .map(|chunk| {
                let [low, high] = chunk else {
                    unreachable!("chunks_exact(2) guarantees 2 bytes")
                };
                // BF16 to F32: BF16 is the upper 16 bits of F32
                let bf16_bits = u16::from_le_bytes([*low, *high]);
                let f32_bits = (bf16_bits as u32) << 16;
                f32::from_bits(f32_bits)
            })
            .collect()
    }
}
