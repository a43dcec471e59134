use anyhow::Result;

/// Capability set the sampling engine needs from a language model.
///
/// Implementations are read-only during inference, so one scorer can back
/// several concurrently running sessions behind an `Arc`.
pub trait ModelScorer: Send + Sync {
    /// Scores the next-token distribution over the whole token sequence.
    ///
    /// Returns one logit per vocabulary entry.
    fn score(&self, tokens: &[usize]) -> Result<Vec<f32>>;

    /// Encodes text into token ids.
    fn encode(&self, text: &str) -> Vec<usize>;

    /// Decodes one token id to its text fragment. Unknown ids decode to the
    /// empty string.
    fn decode(&self, token: usize) -> String;

    fn vocab_size(&self) -> usize;

    fn eos_token_id(&self) -> usize;
}
