//! Tokenizer wrapper for HuggingFace tokenizers
//!
//! Thin interface over `tokenizers` for decoder-model use: plain encoding
//! for generation, fixed-length padded encoding for training.

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use std::path::Path;
use tokenizers::Tokenizer;

use crate::training::hub::{ModelLoader, ModelPath};

/// Special tokens probed for end-of-turn detection, most specific first
const EOS_CANDIDATES: &[&str] = &["<|im_end|>", "<|endoftext|>", "</s>"];

/// Special tokens probed for padding
const PAD_CANDIDATES: &[&str] = &["<|endoftext|>", "<pad>", "</s>"];

/// Wrapper around HuggingFace tokenizer
pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl TokenizerWrapper {
    /// Load tokenizer from a file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        Ok(Self {
            tokenizer,
            max_length: 512,
        })
    }

    /// Load tokenizer from a ModelPath
    pub fn from_model_path(model_path: &ModelPath) -> Result<Self> {
        let tokenizer_path = model_path
            .tokenizer_file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Tokenizer file not found in model path"))?;

        Self::from_file(tokenizer_path)
    }

    /// Load tokenizer from HuggingFace Hub or local path
    pub fn from_pretrained(model_id_or_path: &str) -> Result<Self> {
        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(model_id_or_path)?;
        Self::from_model_path(&model_path)
    }

    /// Set maximum sequence length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Get the maximum sequence length
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Look up a single token's ID
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// End-of-turn token ID, if the vocabulary has one
    pub fn eos_token_id(&self) -> Option<u32> {
        EOS_CANDIDATES.iter().find_map(|t| self.token_id(t))
    }

    /// Padding token ID, falling back to 0 for vocabularies without one
    pub fn pad_token_id(&self) -> u32 {
        PAD_CANDIDATES
            .iter()
            .find_map(|t| self.token_id(t))
            .unwrap_or(0)
    }

    /// Encode a single text
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<EncodedInput> {
        let encoding = self
            .tokenizer
            .encode(text, add_special_tokens)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        Ok(EncodedInput {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    /// Encode with truncation and right-padding to exactly `max_length`
    ///
    /// Used for training batches, where every row must have the same width.
    /// Padding positions get mask 0.
    pub fn encode_padded(&self, text: &str, max_length: usize) -> Result<EncodedInput> {
        let mut encoded = self.encode(text, true)?;

        encoded.input_ids.truncate(max_length);
        encoded.attention_mask.truncate(max_length);

        let pad_id = self.pad_token_id();
        while encoded.input_ids.len() < max_length {
            encoded.input_ids.push(pad_id);
            encoded.attention_mask.push(0);
        }

        Ok(encoded)
    }

    /// Decode token IDs back to text
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

/// Encoded input for a single text
#[derive(Debug, Clone)]
pub struct EncodedInput {
    /// Token IDs
    pub input_ids: Vec<u32>,
    /// Attention mask (1 for real tokens, 0 for padding)
    pub attention_mask: Vec<u32>,
}

impl EncodedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Convert to `[1, seq_len]` tensors
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let input_ids = Tensor::new(&self.input_ids[..], device)?
            .to_dtype(DType::U32)?
            .unsqueeze(0)?;

        let attention_mask = Tensor::new(&self.attention_mask[..], device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?;

        Ok((input_ids, attention_mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_input_to_tensors() {
        let encoded = EncodedInput {
            input_ids: vec![1, 2, 3, 4],
            attention_mask: vec![1, 1, 1, 0],
        };

        let (ids, mask) = encoded.to_tensors(&Device::Cpu).unwrap();
        assert_eq!(ids.dims(), &[1, 4]);
        assert_eq!(mask.dims(), &[1, 4]);
    }

    #[test]
    #[ignore]
    fn test_tokenizer_load() {
        let tokenizer = TokenizerWrapper::from_pretrained("Qwen/Qwen2.5-0.5B-Instruct");
        assert!(
            tokenizer.is_ok(),
            "Failed to load tokenizer: {:?}",
            tokenizer.err()
        );
    }

    #[test]
    #[ignore]
    fn test_tokenizer_encode_padded() {
        let tokenizer = TokenizerWrapper::from_pretrained("Qwen/Qwen2.5-0.5B-Instruct").unwrap();
        let encoded = tokenizer.encode_padded("Establish an incident command post.", 32).unwrap();

        assert_eq!(encoded.len(), 32);
        let real_tokens: u32 = encoded.attention_mask.iter().sum();
        assert!(real_tokens > 0 && (real_tokens as usize) < 32);
    }
}
