use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use q4chat_quant::{MODEL_HEADER_SIZE, MODEL_MAGIC, MODEL_VERSION, QuantizedLinear};

use crate::scorer::ModelScorer;
use crate::tokenizer::Tokenizer;

/// Epsilon value for numerical stability in normalization
const EPSILON: f32 = 1e-6;

/// Decay applied per step when pooling the embedded context; recent tokens
/// dominate the pooled vector.
const CONTEXT_DECAY: f32 = 0.7;

/// Header fields of a packed model file.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
    pub eos_token_id: usize,
    pub group_size: usize,
}

/// Residual feed-forward block built from two quantized linear layers.
struct FeedForward {
    fc: QuantizedLinear,
    proj: QuantizedLinear,
}

impl FeedForward {
    fn forward(&self, x: &[f32]) -> Result<Vec<f32>> {
        let mut hidden = self.fc.forward(x)?;

        // SiLU activation
        for value in hidden.iter_mut() {
            *value *= (1.0f32 + (-*value).exp()).recip();
        }

        let delta = self.proj.forward(&hidden)?;
        Ok(x.iter().zip(&delta).map(|(&a, &b)| a + b).collect())
    }
}

/// Language model scorer backed entirely by quantized linear layers.
///
/// The embedded token sequence is pooled with exponential recency decay,
/// normalized, passed through the residual feed-forward stack and projected
/// to vocabulary logits. All weights are immutable after load, so one model
/// instance can score for any number of concurrent sessions.
pub struct QuantizedModel {
    config: ModelConfig,
    tokenizer: Tokenizer,
    /// Dense embedding table, shape [vocab_size, dim]
    embedding: Vec<f32>,
    layers: Vec<FeedForward>,
    lm_head: QuantizedLinear,
}

impl QuantizedModel {
    /// Loads a model from a packed `q4m` file produced by the converter.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open model file: {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let config = read_header(&mut reader)?;
        let tokenizer = Tokenizer::from_reader(&mut reader, config.eos_token_id)
            .context("Failed to read tokenizer vocabulary")?;

        if tokenizer.vocab_size() != config.vocab_size {
            anyhow::bail!(
                "tokenizer holds {} entries but header declares {}",
                tokenizer.vocab_size(),
                config.vocab_size
            );
        }

        let embedding = read_f32_array(&mut reader, config.vocab_size * config.dim)
            .context("Failed to read embedding table")?;

        let mut layers = Vec::with_capacity(config.n_layers);
        for layer_idx in 0..config.n_layers {
            let fc = read_linear(&mut reader, config.dim, config.hidden_dim, layer_idx, "fc")?;
            let proj = read_linear(&mut reader, config.hidden_dim, config.dim, layer_idx, "proj")?;
            layers.push(FeedForward { fc, proj });
        }

        let lm_head = QuantizedLinear::deserialize(&mut reader)
            .context("Failed to read lm_head tensor")?;
        if lm_head.in_features() != config.dim || lm_head.out_features() != config.vocab_size {
            anyhow::bail!(
                "lm_head is {}x{}, expected {}x{}",
                lm_head.out_features(),
                lm_head.in_features(),
                config.vocab_size,
                config.dim
            );
        }

        Ok(Self {
            config,
            tokenizer,
            embedding,
            layers,
            lm_head,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Pools the embedded sequence into one context vector with exponential
    /// recency decay, then RMS-normalizes it.
    fn pool_context(&self, tokens: &[usize]) -> Result<Vec<f32>> {
        let dim = self.config.dim;
        let mut context = vec![0.0f32; dim];

        for &token in tokens {
            if token >= self.config.vocab_size {
                anyhow::bail!(
                    "token id {token} outside vocabulary of {} entries",
                    self.config.vocab_size
                );
            }
            let offset = token * dim;
            let embedding = &self.embedding[offset..offset + dim];
            for (ctx, &emb) in context.iter_mut().zip(embedding) {
                *ctx = *ctx * CONTEXT_DECAY + emb;
            }
        }

        rms_normalize(&mut context);
        Ok(context)
    }
}

impl ModelScorer for QuantizedModel {
    fn score(&self, tokens: &[usize]) -> Result<Vec<f32>> {
        let mut x = self.pool_context(tokens)?;

        for layer in &self.layers {
            x = layer.forward(&x)?;
        }

        rms_normalize(&mut x);
        Ok(self.lm_head.forward(&x)?)
    }

    fn encode(&self, text: &str) -> Vec<usize> {
        self.tokenizer.encode(text)
    }

    fn decode(&self, token: usize) -> String {
        self.tokenizer.decode(token).into_owned()
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn eos_token_id(&self) -> usize {
        self.config.eos_token_id
    }
}

impl std::fmt::Debug for QuantizedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantizedModel")
            .field("config", &self.config)
            .field("tokenizer", &self.tokenizer)
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

fn read_header<R: Read>(reader: &mut R) -> Result<ModelConfig> {
    let magic = reader.read_u32::<LittleEndian>().context("Failed to read magic number")?;
    if magic != MODEL_MAGIC {
        anyhow::bail!("Invalid model magic number: expected {MODEL_MAGIC:#x}, got {magic:#x}");
    }

    let version = reader.read_i32::<LittleEndian>().context("Failed to read version")?;
    if version != MODEL_VERSION {
        anyhow::bail!("Unsupported model version: expected {MODEL_VERSION}, got {version}");
    }

    macro_rules! read_u32 {
        ($field:literal) => {
            reader
                .read_u32::<LittleEndian>()
                .with_context(|| format!("Failed to read {}", $field))? as usize
        };
    }

    let config = ModelConfig {
        vocab_size: read_u32!("vocabulary size"),
        dim: read_u32!("dimension"),
        hidden_dim: read_u32!("hidden dimension"),
        n_layers: read_u32!("number of layers"),
        eos_token_id: read_u32!("eos token id"),
        group_size: read_u32!("group size"),
    };

    for (name, value) in [
        ("vocab_size", config.vocab_size),
        ("dim", config.dim),
        ("hidden_dim", config.hidden_dim),
        ("n_layers", config.n_layers),
        ("group_size", config.group_size),
    ] {
        if value == 0 {
            anyhow::bail!("Invalid {}: must be positive", name);
        }
    }
    if config.eos_token_id >= config.vocab_size {
        anyhow::bail!(
            "Invalid eos token id {} for vocabulary of {} entries",
            config.eos_token_id,
            config.vocab_size
        );
    }

    // Skip header padding
    let consumed = 4 + 4 + 6 * 4;
    let mut padding = vec![0u8; MODEL_HEADER_SIZE - consumed];
    reader.read_exact(&mut padding).context("Failed to skip header padding")?;

    Ok(config)
}

fn read_f32_array<R: Read>(reader: &mut R, count: usize) -> Result<Vec<f32>> {
    (0..count)
        .map(|_| Ok(reader.read_f32::<LittleEndian>()?))
        .collect()
}

fn read_linear<R: Read>(
    reader: &mut R,
    in_features: usize,
    out_features: usize,
    layer_idx: usize,
    name: &str,
) -> Result<QuantizedLinear> {
    let linear = QuantizedLinear::deserialize(reader)
        .with_context(|| format!("Failed to read layers.{layer_idx}.{name} tensor"))?;

    if linear.in_features() != in_features || linear.out_features() != out_features {
        anyhow::bail!(
            "layers.{layer_idx}.{name} is {}x{}, expected {}x{}",
            linear.out_features(),
            linear.in_features(),
            out_features,
            in_features
        );
    }

    Ok(linear)
}

// Plain RMS normalization: x / sqrt(mean(x^2) + eps).
fn rms_normalize(x: &mut [f32]) {
    let sum_of_squares = x.iter().map(|&v| v * v).sum::<f32>();
    let factor = 1.0f32 / ((sum_of_squares / x.len() as f32) + EPSILON).sqrt();
    x.iter_mut().for_each(|v| *v *= factor);
}
