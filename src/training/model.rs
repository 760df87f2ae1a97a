//! Causal language model with a LoRA adapter
//!
//! Wraps a frozen Qwen2 base model with the trainable [`LoraProjection`]
//! applied to the final hidden states before the LM head. Only the adapter
//! tensors live in the training `VarMap`, so the optimizer never touches
//! base weights.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap};
use candle_transformers::models::qwen2::{Config as Qwen2Config, Model as Qwen2Base};
use std::path::Path;
use std::sync::Mutex;

use crate::training::hub::{HubModelConfig, ModelLoader, ModelPath};
use crate::training::lora::{LoraConfig, LoraProjection, LoraStats};

/// Load the output projection, falling back to tied input embeddings
///
/// Small Qwen2 checkpoints tie `lm_head` to `model.embed_tokens` and ship
/// no separate head tensor.
pub fn load_lm_head(config: &Qwen2Config, vb: &VarBuilder) -> Result<Linear> {
    if let Ok(head) =
        candle_nn::linear_no_bias(config.hidden_size, config.vocab_size, vb.pp("lm_head"))
    {
        return Ok(head);
    }

    let embeddings = vb
        .pp("model.embed_tokens")
        .get((config.vocab_size, config.hidden_size), "weight")
        .context("Failed to load embedding weights for tied lm_head")?;
    Ok(Linear::new(embeddings, None))
}

/// Qwen2 causal LM with trainable LoRA projection
pub struct CausalLmLora {
    /// Forward passes need `&mut` for the internal KV cache
    model: Mutex<Qwen2Base>,
    lm_head: Linear,
    lora: LoraProjection,
    config: Qwen2Config,
    device: Device,
}

impl CausalLmLora {
    /// Load from resolved model files, registering adapter tensors in `var_map`
    pub fn from_model_path(
        model_path: &ModelPath,
        lora_config: &LoraConfig,
        var_map: &VarMap,
        device: &Device,
    ) -> Result<Self> {
        let hub_config = HubModelConfig::from_file(&model_path.config_file)?;
        hub_config.validate_qwen_compatibility()?;

        let config_str = std::fs::read_to_string(&model_path.config_file)
            .context("Failed to read model config")?;
        let config: Qwen2Config =
            serde_json::from_str(&config_str).context("Failed to parse Qwen2 config")?;

        tracing::info!(
            "Loading Qwen2 for training: hidden={}, layers={}, vocab={}, lora_rank={}",
            config.hidden_size,
            config.num_hidden_layers,
            config.vocab_size,
            lora_config.rank
        );

        // F32 for training stability
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&model_path.weight_files, DType::F32, device)
                .context("Failed to load model weights")?
        };

        let model = Qwen2Base::new(&config, vb.clone()).context("Failed to load Qwen2 model")?;
        let lm_head = load_lm_head(&config, &vb)?;
        let lora = LoraProjection::new(var_map, config.hidden_size, lora_config, device)?;

        Ok(Self {
            model: Mutex::new(model),
            lm_head,
            lora,
            config,
            device: device.clone(),
        })
    }

    /// Load from a HuggingFace model ID or local path
    pub fn from_pretrained(
        model_id: &str,
        lora_config: &LoraConfig,
        var_map: &VarMap,
        device: &Device,
    ) -> Result<Self> {
        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(model_id)?;
        Self::from_model_path(&model_path, lora_config, var_map, device)
    }

    /// Forward pass returning full-sequence logits `[batch, seq, vocab]`
    ///
    /// Each call is an independent full-sequence pass, so the KV cache is
    /// cleared first.
    pub fn forward_logits(&self, input_ids: &Tensor, train: bool) -> Result<Tensor> {
        let hidden = {
            let mut model = self
                .model
                .lock()
                .map_err(|e| anyhow::anyhow!("Model lock poisoned: {}", e))?;
            model.clear_kv_cache();
            model.forward(input_ids, 0, None)?
        };

        let hidden = self.lora.apply_t(&hidden, train)?;
        let logits = self.lm_head.forward(&hidden)?;
        Ok(logits)
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn lora(&self) -> &LoraProjection {
        &self.lora
    }

    /// Save the adapter as a standalone directory
    pub fn save_adapter(&self, dir: impl AsRef<Path>, base_model: &str) -> Result<()> {
        self.lora.save_to_dir(dir, base_model)
    }

    /// Trainable/total parameter stats
    pub fn stats(&self) -> LoraStats {
        self.lora.stats(base_param_count(&self.config))
    }
}

/// Parameter count of a Qwen2 base model from its config
pub fn base_param_count(config: &Qwen2Config) -> usize {
    let h = config.hidden_size;
    let i = config.intermediate_size;
    let head_dim = h / config.num_attention_heads;
    let kv = config.num_key_value_heads * head_dim;

    // q has bias, k/v have bias, o does not
    let attention = (h * h + h) + 2 * (h * kv + kv) + h * h;
    let mlp = 3 * h * i;
    let norms = 2 * h;
    let per_layer = attention + mlp + norms;

    let embeddings = config.vocab_size * h;
    let final_norm = h;

    per_layer * config.num_hidden_layers + embeddings + final_norm
}

#[cfg(test)]
mod tests {
    use super::*;

    // Matches the published Qwen2.5-0.5B-Instruct config.json
    const QWEN_05B_CONFIG: &str = r#"{
        "architectures": ["Qwen2ForCausalLM"],
        "attention_dropout": 0.0,
        "bos_token_id": 151643,
        "eos_token_id": 151645,
        "hidden_act": "silu",
        "hidden_size": 896,
        "initializer_range": 0.02,
        "intermediate_size": 4864,
        "max_position_embeddings": 32768,
        "max_window_layers": 21,
        "model_type": "qwen2",
        "num_attention_heads": 14,
        "num_hidden_layers": 24,
        "num_key_value_heads": 2,
        "rms_norm_eps": 1e-06,
        "rope_theta": 1000000.0,
        "sliding_window": 32768,
        "tie_word_embeddings": true,
        "torch_dtype": "bfloat16",
        "use_cache": true,
        "use_sliding_window": false,
        "vocab_size": 151936
    }"#;

    #[test]
    fn test_qwen_config_parses() {
        let config: Qwen2Config = serde_json::from_str(QWEN_05B_CONFIG).unwrap();
        assert_eq!(config.hidden_size, 896);
        assert_eq!(config.num_hidden_layers, 24);
    }

    #[test]
    fn test_base_param_count_matches_model_size() {
        let config: Qwen2Config = serde_json::from_str(QWEN_05B_CONFIG).unwrap();
        let params = base_param_count(&config) as f64 / 1e6;

        // Qwen2.5-0.5B is roughly 494M parameters
        assert!(params > 480.0 && params < 510.0, "got {:.1}M", params);
    }
}
