/// Stores a candidate's weight and its associated token id.
///
/// The `prob` field holds a logit while candidates are being collected and a
/// probability once the nucleus cutoff has normalized them.
#[derive(Clone, Debug)]
pub struct ProbIndex {
    pub prob: f32,
    pub index: usize,
}

/// Temperature/top-k/top-p sampler for language model logits.
///
/// Filtering order per decode step: temperature scaling, top-k truncation,
/// nucleus (top-p) truncation, softmax, multinomial draw. A temperature of
/// zero bypasses all randomness and returns the argmax. Uses a simple
/// xorshift RNG for reproducibility.
#[derive(Debug)]
pub struct Sampler {
    probindex: Vec<ProbIndex>,
    temperature: f32,
    top_p: f32,
    top_k: usize,
    rng_state: u64,
}

impl Sampler {
    /// Creates a new sampler.
    ///
    /// # Arguments
    /// * `vocab_size` - Size of the vocabulary
    /// * `temperature` - Sampling temperature (0.0 for greedy decoding)
    /// * `top_p` - Nucleus threshold in (0.0, 1.0]
    /// * `top_k` - Number of highest-logit candidates kept (clamped to vocab)
    /// * `rng_seed` - Random seed for reproducibility
    pub fn new(vocab_size: usize, temperature: f32, top_p: f32, top_k: usize, rng_seed: u64) -> Self {
        assert!(vocab_size > 0, "Vocab size must be positive");
        assert!(temperature >= 0.0, "Temperature must be non-negative");
        assert!(top_p > 0.0 && top_p <= 1.0, "Top-p must be in (0.0, 1.0]");
        assert!(top_k > 0, "Top-k must be positive");

        Self {
            probindex: vec![
                ProbIndex {
                    prob: 0.0,
                    index: 0
                };
                vocab_size
            ],
            temperature,
            top_p,
            top_k,
            rng_state: rng_seed,
        }
    }

    /// Xorshift-based random number generator.
    fn random_u32(&mut self) -> u32 {
        self.rng_state ^= self.rng_state >> 12;
        self.rng_state ^= self.rng_state << 25;
        self.rng_state ^= self.rng_state >> 27;
        ((self.rng_state.wrapping_mul(0x2545F4914F6CDD1D)) >> 32) as u32
    }

    /// Returns a random float in [0, 1).
    fn random_f32(&mut self) -> f32 {
        (self.random_u32() >> 8) as f32 / 16777216.0
    }

    /// Returns the index of the maximum logit (greedy decoding).
    fn sample_argmax(logits: &[f32]) -> usize {
        logits
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap_or_default()
    }

    /// Sorts all logits descending into the candidate workspace and returns
    /// the top-k count: exactly `min(top_k, vocab_size)` survive.
    fn collect_top_k(&mut self, logits: &[f32]) -> usize {
        for (slot, (index, &prob)) in self.probindex.iter_mut().zip(logits.iter().enumerate()) {
            *slot = ProbIndex { prob, index };
        }
        self.probindex[..logits.len()].sort_unstable_by(|a, b| b.prob.total_cmp(&a.prob));

        self.top_k.min(logits.len())
    }

    /// Softmaxes the candidates in place and returns the nucleus size: the
    /// smallest prefix whose cumulative probability exceeds `top_p`, never
    /// fewer than one entry.
    fn nucleus_cutoff(candidates: &mut [ProbIndex], top_p: f32) -> usize {
        let max_logit = candidates[0].prob;
        let mut sum = 0.0f32;
        for candidate in candidates.iter_mut() {
            candidate.prob = (candidate.prob - max_logit).exp();
            sum += candidate.prob;
        }
        let inv_sum = sum.recip();

        let mut cumulative = 0.0f32;
        let len = candidates.len();
        let mut cutoff = len;
        for (i, candidate) in candidates.iter_mut().enumerate() {
            candidate.prob *= inv_sum;
            if cutoff == len {
                cumulative += candidate.prob;
                if cumulative > top_p {
                    cutoff = i + 1;
                }
            }
        }

        cutoff.max(1)
    }

    /// Multinomial draw from the truncated, renormalized candidate list.
    fn sample_from(candidates: &[ProbIndex], coin: f32) -> usize {
        let total: f32 = candidates.iter().map(|c| c.prob).sum();
        let target = coin * total;

        let mut cdf = 0.0f32;
        for candidate in candidates {
            cdf += candidate.prob;
            if target < cdf {
                return candidate.index;
            }
        }
        candidates[candidates.len() - 1].index
    }

    /// Samples a token index from logits.
    ///
    /// - If temperature is 0, returns the argmax (greedy).
    /// - Otherwise applies temperature scaling, top-k and nucleus filtering,
    ///   then draws proportionally to the filtered softmax.
    pub fn sample(&mut self, logits: &mut [f32]) -> usize {
        if self.temperature == 0.0 {
            return Self::sample_argmax(logits);
        }

        for logit in logits.iter_mut() {
            *logit /= self.temperature;
        }

        let top_k = self.collect_top_k(logits);
        let nucleus = Self::nucleus_cutoff(&mut self.probindex[..top_k], self.top_p);
        let coin = self.random_f32();

        Self::sample_from(&self.probindex[..nucleus], coin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_zero_is_seed_independent_argmax() {
        let mut logits = [0.1, 2.5, -1.0, 2.4];
        for seed in [1u64, 42, 0xDEAD_BEEF] {
            let mut sampler = Sampler::new(4, 0.0, 0.95, 40, seed);
            assert_eq!(sampler.sample(&mut logits.clone()), 1);
            assert_eq!(sampler.sample(&mut logits), 1);
        }
    }

    #[test]
    fn top_k_retains_exactly_min_of_k_and_vocab() {
        let logits = [0.0, 3.0, 1.0, 2.0, -1.0];

        let mut sampler = Sampler::new(5, 1.0, 1.0, 3, 7);
        assert_eq!(sampler.collect_top_k(&logits), 3);
        // Sorted descending: ids 1, 3, 2 lead
        assert_eq!(sampler.probindex[0].index, 1);
        assert_eq!(sampler.probindex[1].index, 3);
        assert_eq!(sampler.probindex[2].index, 2);

        let mut sampler = Sampler::new(5, 1.0, 1.0, 50, 7);
        assert_eq!(sampler.collect_top_k(&logits), 5);
    }

    #[test]
    fn nucleus_keeps_at_least_one_candidate() {
        // First candidate alone exceeds top_p
        let mut candidates = vec![
            ProbIndex { prob: 10.0, index: 2 },
            ProbIndex { prob: 0.0, index: 0 },
            ProbIndex { prob: -1.0, index: 1 },
        ];
        let kept = Sampler::nucleus_cutoff(&mut candidates, 0.1);
        assert_eq!(kept, 1);
        assert_eq!(candidates[0].index, 2);
    }

    #[test]
    fn nucleus_with_top_p_one_keeps_everything() {
        let mut candidates = vec![
            ProbIndex { prob: 1.0, index: 0 },
            ProbIndex { prob: 0.5, index: 1 },
            ProbIndex { prob: 0.0, index: 2 },
        ];
        assert_eq!(Sampler::nucleus_cutoff(&mut candidates, 1.0), 3);

        let total: f32 = candidates.iter().map(|c| c.prob).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn nucleus_truncates_low_probability_tail() {
        // Two dominant candidates cover > 0.8 of the mass
        let mut candidates = vec![
            ProbIndex { prob: 4.0, index: 5 },
            ProbIndex { prob: 4.0, index: 9 },
            ProbIndex { prob: -4.0, index: 1 },
            ProbIndex { prob: -4.0, index: 3 },
        ];
        assert_eq!(Sampler::nucleus_cutoff(&mut candidates, 0.8), 2);
    }

    #[test]
    fn sample_stays_within_nucleus() {
        // Tokens 0 and 1 dominate: everything else is filtered out
        let mut sampler = Sampler::new(6, 0.8, 0.9, 2, 1234);
        for _ in 0..64 {
            let mut logits = [5.0, 5.0, -5.0, -5.0, -5.0, -5.0];
            let token = sampler.sample(&mut logits);
            assert!(token < 2, "token {token} escaped the filtered set");
        }
    }

    #[test]
    fn sample_mult_hits_last_candidate_on_high_coin() {
        let candidates = vec![
            ProbIndex { prob: 0.5, index: 3 },
            ProbIndex { prob: 0.5, index: 8 },
        ];
        assert_eq!(Sampler::sample_from(&candidates, 0.999), 8);
        assert_eq!(Sampler::sample_from(&candidates, 0.0), 3);
    }
}
