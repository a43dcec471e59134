//! # q4chat-inference
//!
//! Autoregressive token sampling over an opaque scorer, streamed across the
//! blocking/async boundary with cooperative cancellation.

mod engine;
mod error;
mod model;
mod sampler;
mod scorer;
mod stream;
mod tokenizer;

use std::time::{SystemTime, UNIX_EPOCH};

pub use engine::{GenerationSession, SamplingEngine, SessionState};
pub use error::GenerationError;
pub use model::{ModelConfig, QuantizedModel};
pub use sampler::Sampler;
pub use scorer::ModelScorer;
pub use stream::{CancelHandle, FinishReason, TokenEvent, TokenStream};
pub use tokenizer::Tokenizer;

/// Controls for one generation session.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Sampling temperature; 0.0 selects deterministic argmax decoding.
    pub temperature: f32,
    /// Nucleus threshold in (0.0, 1.0].
    pub top_p: f32,
    /// Highest-logit candidates kept per step, clamped to the vocabulary.
    pub top_k: usize,
    /// Upper bound on generated tokens per turn.
    pub max_new_tokens: usize,
    /// Token id that completes the session when sampled.
    pub eos_token_id: usize,
    /// RNG seed for reproducible sampling.
    pub seed: u64,
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct GenerationConfigBuilder {
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<usize>,
    max_new_tokens: Option<usize>,
    eos_token_id: Option<usize>,
    seed: Option<u64>,
}

impl GenerationConfigBuilder {
    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
    pub fn top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }
    pub fn top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }
    pub fn max_new_tokens(mut self, max_new_tokens: Option<usize>) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }
    pub fn eos_token_id(mut self, eos_token_id: usize) -> Self {
        self.eos_token_id = Some(eos_token_id);
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn build(self) -> Result<GenerationConfig, String> {
        let config = GenerationConfig {
            temperature: self.temperature.unwrap_or(0.7),
            top_p: self.top_p.unwrap_or(0.95),
            top_k: self.top_k.unwrap_or(40),
            max_new_tokens: self.max_new_tokens.unwrap_or(1024),
            eos_token_id: self.eos_token_id.ok_or("eos_token_id is required")?,
            seed: self.seed.unwrap_or_else(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs()
            }),
        };

        if config.temperature < 0.0 {
            return Err("temperature must be non-negative".to_string());
        }
        if !(config.top_p > 0.0 && config.top_p <= 1.0) {
            return Err("top_p must be in (0.0, 1.0]".to_string());
        }
        if config.top_k == 0 {
            return Err("top_k must be positive".to_string());
        }

        Ok(config)
    }
}
