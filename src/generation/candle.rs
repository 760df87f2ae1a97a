//! Candle-based decoder model implementation
//!
//! Supports Qwen2-family models via the Candle ML framework, with optional
//! LoRA adapters applied over the final hidden states.

use anyhow::{Context, Result};
use candle_core::{DType, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::qwen2::{Config as Qwen2Config, Model as Qwen2Base};
use candle_core::Device;
use std::sync::Mutex;

use super::{Generator, GeneratorConfig, SamplingParams};
use crate::training::hub::{HubModelConfig, ModelLoader};
use crate::training::lora::LoraProjection;
use crate::training::model::load_lm_head;
use crate::training::{select_device, TokenizerWrapper};

/// Candle-based text generator for Qwen2-family models
pub struct CandleGenerator {
    /// Generation holds this lock for the whole sampling loop: the KV cache
    /// inside the model spans forward calls
    model: Mutex<Qwen2Base>,
    lm_head: Linear,
    adapter: Option<LoraProjection>,
    tokenizer: TokenizerWrapper,
    config: GeneratorConfig,
    device: Device,
    /// Token IDs that terminate a turn (EOS plus chat end-of-turn)
    stop_tokens: Vec<u32>,
}

impl CandleGenerator {
    /// Create a new Candle generator from config
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let device = select_device(config.device)?;

        tracing::info!("Loading generator model: {}", config.model_id);
        tracing::info!("  Device: {:?}", device);
        tracing::info!("  Max new tokens: {}", config.max_new_tokens);
        tracing::info!("  Dtype: {}", config.dtype);

        let tokenizer = TokenizerWrapper::from_pretrained(&config.model_id)
            .context("Failed to load tokenizer")?
            .with_max_length(config.max_seq_length);

        let mut stop_tokens = Vec::new();
        for token in ["<|im_end|>", "<|endoftext|>"] {
            if let Some(id) = tokenizer.token_id(token) {
                if !stop_tokens.contains(&id) {
                    stop_tokens.push(id);
                }
            }
        }
        if stop_tokens.is_empty() {
            stop_tokens.push(151643); // Qwen2 default EOS
        }

        let (model, lm_head) = Self::load_model(&config, &device)?;

        let adapter = match &config.adapter_path {
            Some(path) => {
                let projection =
                    LoraProjection::load(path, config.lora_rank, config.lora_alpha, &device)
                        .with_context(|| format!("Failed to load LoRA adapter from {}", path))?;
                tracing::info!("Loaded LoRA adapter: {} (rank {})", path, projection.rank());
                Some(projection)
            }
            None => None,
        };

        tracing::info!("Generator loaded successfully");

        Ok(Self {
            model: Mutex::new(model),
            lm_head,
            adapter,
            tokenizer,
            config,
            device,
            stop_tokens,
        })
    }

    fn load_model(config: &GeneratorConfig, device: &Device) -> Result<(Qwen2Base, Linear)> {
        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(&config.model_id)?;

        let hub_config = HubModelConfig::from_file(&model_path.config_file)?;
        hub_config.validate_qwen_compatibility()?;

        let dtype = match config.dtype.as_str() {
            "f16" => DType::F16,
            "bf16" => DType::BF16,
            _ => DType::F32,
        };

        let config_str = std::fs::read_to_string(&model_path.config_file)
            .context("Failed to read model config")?;
        let qwen_config: Qwen2Config =
            serde_json::from_str(&config_str).context("Failed to parse Qwen2 config")?;

        tracing::info!(
            "Loading Qwen2: vocab={}, hidden={}, layers={}",
            qwen_config.vocab_size,
            qwen_config.hidden_size,
            qwen_config.num_hidden_layers
        );

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&model_path.weight_files, dtype, device)
                .context("Failed to load model weights")?
        };

        let model = Qwen2Base::new(&qwen_config, vb.clone()).context("Failed to create Qwen2 model")?;
        let lm_head = load_lm_head(&qwen_config, &vb)?;

        Ok((model, lm_head))
    }

    /// Internal generation with sampling
    fn generate_internal(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let encoded = self.tokenizer.encode(prompt, true)?;
        let prompt_tokens = encoded.input_ids;
        let prompt_len = prompt_tokens.len();

        if prompt_len == 0 {
            anyhow::bail!("Empty prompt after tokenization");
        }

        let mut all_tokens = prompt_tokens;
        let max_tokens = params.max_new_tokens.unwrap_or(self.config.max_new_tokens);

        let seed = params.seed.unwrap_or(42);
        let temperature = if params.temperature > 0.0 {
            Some(params.temperature as f64)
        } else {
            None
        };
        let top_p = if params.top_p < 1.0 {
            Some(params.top_p as f64)
        } else {
            None
        };

        let mut logits_processor = LogitsProcessor::new(seed, temperature, top_p);

        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Model lock poisoned: {}", e))?;
        model.clear_kv_cache();

        let mut pos = 0;
        for _ in 0..max_tokens {
            // Full prompt on the first pass, a single token afterwards
            let context_size = if pos == 0 { all_tokens.len() } else { 1 };
            let start_idx = all_tokens.len().saturating_sub(context_size);
            let input_ids: Vec<u32> = all_tokens[start_idx..].to_vec();

            let input_tensor = Tensor::new(&input_ids[..], &self.device)?.unsqueeze(0)?;

            let hidden = model.forward(&input_tensor, pos, None)?;
            let seq_len = hidden.dim(1)?;
            let last_hidden = hidden.narrow(1, seq_len - 1, 1)?;
            let last_hidden = match &self.adapter {
                Some(adapter) => adapter.apply(&last_hidden)?,
                None => last_hidden,
            };

            let logits = self.lm_head.forward(&last_hidden)?;
            let logits = logits.squeeze(1)?.squeeze(0)?.to_dtype(DType::F32)?;

            let logits = if params.top_k > 0 {
                Self::apply_top_k(&logits, params.top_k)?
            } else {
                logits
            };

            let logits = if params.repetition_penalty != 1.0 {
                Self::apply_repetition_penalty(&logits, &all_tokens, params.repetition_penalty)?
            } else {
                logits
            };

            let next_token = logits_processor.sample(&logits)?;

            all_tokens.push(next_token);
            pos += context_size;

            if self.stop_tokens.contains(&next_token) {
                tracing::debug!("Generation stopped: end-of-turn token");
                break;
            }

            if !params.stop_sequences.is_empty() {
                let generated = self.tokenizer.decode(&all_tokens[prompt_len..], true)?;
                if params.stop_sequences.iter().any(|s| generated.contains(s)) {
                    tracing::debug!("Generation stopped: stop sequence");
                    break;
                }
            }
        }

        let generated_tokens = &all_tokens[prompt_len..];
        let output = self.tokenizer.decode(generated_tokens, true)?;

        Ok(output.trim().to_string())
    }

    /// Apply top-k filtering to logits
    fn apply_top_k(logits: &Tensor, k: usize) -> Result<Tensor> {
        let vocab_size = logits.dim(0)?;
        if k >= vocab_size {
            return Ok(logits.clone());
        }

        let logits_vec: Vec<f32> = logits.to_vec1()?;
        let mut indexed: Vec<(usize, f32)> = logits_vec.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut filtered = vec![f32::NEG_INFINITY; vocab_size];
        for (idx, val) in indexed.into_iter().take(k) {
            filtered[idx] = val;
        }

        Ok(Tensor::new(&filtered[..], logits.device())?)
    }

    /// Apply repetition penalty over already-generated tokens
    fn apply_repetition_penalty(logits: &Tensor, tokens: &[u32], penalty: f32) -> Result<Tensor> {
        let mut logits_vec: Vec<f32> = logits.to_vec1()?;

        for &token in tokens {
            let idx = token as usize;
            if idx < logits_vec.len() {
                if logits_vec[idx] > 0.0 {
                    logits_vec[idx] /= penalty;
                } else {
                    logits_vec[idx] *= penalty;
                }
            }
        }

        Ok(Tensor::new(&logits_vec[..], logits.device())?)
    }
}

impl Generator for CandleGenerator {
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        self.generate_internal(prompt, params)
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }

    fn max_context_length(&self) -> usize {
        self.config.max_seq_length
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        let encoded = self.tokenizer.encode(text, false)?;
        Ok(encoded.input_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::DevicePreference;

    #[test]
    fn test_generator_config() {
        let config = GeneratorConfig::new("test-model")
            .with_max_new_tokens(256)
            .with_device(DevicePreference::Cpu);

        assert_eq!(config.model_id, "test-model");
        assert_eq!(config.max_new_tokens, 256);
    }

    #[test]
    #[ignore]
    fn test_generate_end_to_end() {
        let config = GeneratorConfig::new("Qwen/Qwen2.5-0.5B-Instruct")
            .with_device(DevicePreference::Cpu);
        let generator = CandleGenerator::new(config).unwrap();

        let params = SamplingParams::greedy().with_max_new_tokens(8);
        let output = generator.generate("Hello", &params).unwrap();
        assert!(!output.is_empty());
    }
}
