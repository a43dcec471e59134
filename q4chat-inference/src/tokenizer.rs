//! Byte-level tokenizer loaded from the model file.
//!
//! The vocabulary is a list of raw byte strings (every single byte plus the
//! end-of-sequence marker). Encoding is greedy longest-match over the input
//! bytes; decoding returns the token's raw bytes, which individually may be
//! an incomplete UTF-8 sequence but concatenate into valid text downstream.

use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use std::borrow::Cow;
use std::io::Read;

pub struct Tokenizer {
    /// Vocabulary: each token is a byte sequence (not necessarily valid UTF-8)
    vocab: Vec<Vec<u8>>,
    /// Longest token length in bytes, bounds the match window
    max_token_length: usize,
    eos_token_id: usize,
}

impl Tokenizer {
    pub fn new(vocab: Vec<Vec<u8>>, eos_token_id: usize) -> Result<Self> {
        if vocab.is_empty() {
            anyhow::bail!("Tokenizer vocabulary is empty");
        }
        if eos_token_id >= vocab.len() {
            anyhow::bail!(
                "eos token id {eos_token_id} outside vocabulary of {} entries",
                vocab.len()
            );
        }

        let max_token_length = vocab.iter().map(Vec::len).max().unwrap_or(0);
        Ok(Self {
            vocab,
            max_token_length,
            eos_token_id,
        })
    }

    /// Reads the vocabulary section of a model file: entry count, then one
    /// length-prefixed byte string per token.
    pub fn from_reader<R: Read>(reader: &mut R, eos_token_id: usize) -> Result<Self> {
        let count = reader.read_u32::<LittleEndian>()? as usize;

        let mut vocab = Vec::with_capacity(count);
        for _ in 0..count {
            let len = reader.read_u32::<LittleEndian>()? as usize;
            let mut token_bytes = vec![0u8; len];
            reader.read_exact(&mut token_bytes)?;
            vocab.push(token_bytes);
        }

        Self::new(vocab, eos_token_id)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn eos_token_id(&self) -> usize {
        self.eos_token_id
    }

    /// Encodes text into token ids by greedy longest-match over its bytes.
    pub fn encode(&self, text: &str) -> Vec<usize> {
        let bytes = text.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            let window = (bytes.len() - i).min(self.max_token_length);
            let mut best: Option<(usize, usize)> = None; // (length, id)

            for (id, token) in self.vocab.iter().enumerate() {
                if token.len() <= window
                    && !token.is_empty()
                    && bytes[i..i + token.len()] == token[..]
                    && best.is_none_or(|(len, _)| token.len() > len)
                {
                    best = Some((token.len(), id));
                }
            }

            match best {
                Some((len, id)) => {
                    tokens.push(id);
                    i += len;
                }
                None => {
                    // Byte-level vocabularies always match; skip otherwise.
                    i += 1;
                }
            }
        }

        tokens
    }

    /// Decodes a token ID to a string (may be invalid UTF-8).
    ///
    /// Returns a borrowed str if valid UTF-8, otherwise an owned String.
    pub fn decode(&self, token: usize) -> Cow<'_, str> {
        if token < self.vocab.len() {
            match std::str::from_utf8(&self.vocab[token]) {
                Ok(valid_str) => Cow::Borrowed(valid_str),
                Err(_) => {
                    // SAFETY: for incomplete UTF-8 sequences (like partial
                    // multi-byte characters) the exact bytes must be
                    // preserved so consecutive fragments concatenate into
                    // valid text.
                    let string = unsafe { String::from_utf8_unchecked(self.vocab[token].clone()) };
                    Cow::Owned(string)
                }
            }
        } else {
            Cow::Borrowed("")
        }
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab.len())
            .field("max_token_length", &self.max_token_length)
            .field("eos_token_id", &self.eos_token_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_tokenizer() -> Tokenizer {
        let mut vocab: Vec<Vec<u8>> = (0u8..=255).map(|b| vec![b]).collect();
        vocab.push(b"<|endoftext|>".to_vec());
        Tokenizer::new(vocab, 256).unwrap()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let tokenizer = byte_tokenizer();
        let tokens = tokenizer.encode("hi!");
        assert_eq!(tokens, vec![b'h' as usize, b'i' as usize, b'!' as usize]);

        let text: String = tokens.iter().map(|&t| tokenizer.decode(t)).collect();
        assert_eq!(text, "hi!");
    }

    #[test]
    fn longest_match_wins_over_single_bytes() {
        let tokenizer = byte_tokenizer();
        let tokens = tokenizer.encode("a<|endoftext|>b");
        assert_eq!(tokens, vec![b'a' as usize, 256, b'b' as usize]);
    }

    #[test]
    fn multibyte_text_reassembles() {
        let tokenizer = byte_tokenizer();
        let tokens = tokenizer.encode("héllo");
        let text: String = tokens.iter().map(|&t| tokenizer.decode(t)).collect();
        assert_eq!(text, "héllo");
    }

    #[test]
    fn unknown_id_decodes_to_empty() {
        let tokenizer = byte_tokenizer();
        assert_eq!(tokenizer.decode(9999), "");
    }

    #[test]
    fn eos_outside_vocab_rejected() {
        assert!(Tokenizer::new(vec![vec![0u8]], 5).is_err());
    }
}
