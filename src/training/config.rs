//! Training run configuration
//!
//! Loaded from a JSON file; any missing key falls back to the defaults
//! below, so a minimal config only needs the paths.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fine-tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Base model: HuggingFace ID or local directory
    pub model_path: String,
    /// Training data JSON file
    pub data_path: String,
    /// Output directory for checkpoints and the final adapter
    pub output_dir: String,
    /// Number of training epochs
    pub num_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Base learning rate
    pub learning_rate: f64,
    /// Gradient accumulation steps
    pub gradient_accumulation_steps: usize,
    /// Linear warmup steps
    pub warmup_steps: usize,
    /// Log metrics every N optimization steps
    pub logging_steps: usize,
    /// Save a checkpoint every N optimization steps (0 to disable)
    pub save_steps: usize,
    /// Evaluate on the held-out split every N optimization steps (0 to disable)
    pub eval_steps: usize,
    /// Maximum sequence length in tokens
    pub max_length: usize,
    /// AdamW weight decay
    pub weight_decay: f64,
    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,
    /// LoRA rank
    pub lora_rank: usize,
    /// LoRA alpha
    pub lora_alpha: f32,
    /// LoRA dropout
    pub lora_dropout: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_path: "Qwen/Qwen2.5-0.5B-Instruct".to_string(),
            data_path: "data/emergency_training_data.json".to_string(),
            output_dir: "./output".to_string(),
            num_epochs: 3,
            batch_size: 1,
            learning_rate: 1e-4,
            gradient_accumulation_steps: 8,
            warmup_steps: 20,
            logging_steps: 1,
            save_steps: 10,
            eval_steps: 10,
            max_length: 512,
            weight_decay: 0.01,
            max_grad_norm: 1.0,
            lora_rank: 8,
            lora_alpha: 16.0,
            lora_dropout: 0.1,
        }
    }
}

impl TrainingConfig {
    /// Load from a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training config: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse training config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            anyhow::bail!("num_epochs must be at least 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.gradient_accumulation_steps == 0 {
            anyhow::bail!("gradient_accumulation_steps must be at least 1");
        }
        if self.learning_rate <= 0.0 {
            anyhow::bail!("learning_rate must be positive");
        }
        if self.max_length < 2 {
            anyhow::bail!("max_length must be at least 2 for next-token training");
        }
        if self.lora_rank == 0 {
            anyhow::bail!("lora_rank must be at least 1");
        }
        Ok(())
    }

    /// Effective batch size after accumulation
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size * self.gradient_accumulation_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.gradient_accumulation_steps, 8);
        assert!((config.learning_rate - 1e-4).abs() < 1e-12);
        assert_eq!(config.warmup_steps, 20);
        assert_eq!(config.max_length, 512);
        assert_eq!(config.effective_batch_size(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model_path": "./my-model", "data_path": "./data.json", "num_epochs": 5}}"#
        )
        .unwrap();

        let config = TrainingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model_path, "./my-model");
        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_length, 512);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"num_epochs": 0}}"#).unwrap();
        assert!(TrainingConfig::from_file(file.path()).is_err());
    }
}
