//! LoRA adapter for parameter-efficient fine-tuning
//!
//! Instead of fine-tuning all model weights, trains a low-rank residual
//! update applied to the final hidden states:
//!
//! ```text
//! h' = h + (h A^T B^T) * (alpha / rank)
//! ```
//!
//! Where:
//! - A ∈ ℝ^(rank × hidden) initialized with Kaiming uniform
//! - B ∈ ℝ^(hidden × rank) initialized to zeros
//!
//! B starting at zero makes the adapter an exact no-op before training.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// LoRA configuration
#[derive(Debug, Clone)]
pub struct LoraConfig {
    /// Rank of the low-rank decomposition (typically 4-64)
    pub rank: usize,
    /// Scaling factor (typically rank * 2)
    pub alpha: f32,
    /// Dropout probability on the adapter branch during training
    pub dropout: f32,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            rank: 8,
            alpha: 16.0,
            dropout: 0.1,
        }
    }
}

impl LoraConfig {
    pub fn new(rank: usize, alpha: f32) -> Self {
        Self {
            rank,
            alpha,
            ..Default::default()
        }
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Get the scaling factor
    pub fn scaling(&self) -> f32 {
        self.alpha / self.rank as f32
    }
}

/// Adapter metadata persisted alongside the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub rank: usize,
    pub alpha: f32,
    #[serde(default)]
    pub dropout: f32,
    pub base_model: String,
    /// When the adapter was saved, RFC 3339
    #[serde(default)]
    pub created_at: String,
}

impl AdapterConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read adapter config: {:?}", path.as_ref()))?;
        serde_json::from_str(&content).context("Failed to parse adapter_config.json")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write adapter config: {:?}", path.as_ref()))?;
        Ok(())
    }
}

/// Trainable low-rank residual projection over hidden states
pub struct LoraProjection {
    /// Down projection: hidden -> rank
    down: Tensor,
    /// Up projection: rank -> hidden
    up: Tensor,
    /// Scaling factor (alpha / rank)
    scaling: f32,
    /// Dropout on the adapter branch, training only
    dropout: f32,
}

impl LoraProjection {
    /// Create trainable adapter tensors registered in `var_map`
    pub fn new(
        var_map: &VarMap,
        hidden_size: usize,
        config: &LoraConfig,
        device: &Device,
    ) -> Result<Self> {
        let vb = VarBuilder::from_varmap(var_map, DType::F32, device);

        let down = vb.get_with_hints(
            (config.rank, hidden_size),
            "lora_projection.down",
            Init::Kaiming {
                dist: candle_nn::init::NormalOrUniform::Uniform,
                fan: candle_nn::init::FanInOut::FanIn,
                non_linearity: candle_nn::init::NonLinearity::Linear,
            },
        )?;

        let up = vb.get_with_hints(
            (hidden_size, config.rank),
            "lora_projection.up",
            Init::Const(0.0),
        )?;

        tracing::debug!(
            "Created LoRA projection: {} trainable params",
            config.rank * hidden_size * 2
        );

        Ok(Self {
            down,
            up,
            scaling: config.scaling(),
            dropout: config.dropout,
        })
    }

    /// Load a saved adapter
    ///
    /// `path` may be an adapter directory (adapter.safetensors plus
    /// adapter_config.json) or a bare safetensors file. A config file wins
    /// over the `rank`/`alpha` fallbacks.
    pub fn load(
        path: impl AsRef<Path>,
        rank: usize,
        alpha: f32,
        device: &Device,
    ) -> Result<Self> {
        let path = path.as_ref();

        let (weights_file, adapter_config) = if path.is_dir() {
            let config_file = path.join("adapter_config.json");
            let config = if config_file.exists() {
                Some(AdapterConfig::from_file(&config_file)?)
            } else {
                None
            };
            (path.join("adapter.safetensors"), config)
        } else {
            (path.to_path_buf(), None)
        };

        if !weights_file.exists() {
            return Err(anyhow!("Adapter weights not found: {:?}", weights_file));
        }

        let tensors = candle_core::safetensors::load(&weights_file, device)?;
        let down = tensors
            .get("lora_projection.down")
            .ok_or_else(|| anyhow!("Missing lora_projection.down in {:?}", weights_file))?
            .clone();
        let up = tensors
            .get("lora_projection.up")
            .ok_or_else(|| anyhow!("Missing lora_projection.up in {:?}", weights_file))?
            .clone();

        let (actual_rank, hidden) = down.dims2()?;
        let (up_hidden, up_rank) = up.dims2()?;
        if up_hidden != hidden || up_rank != actual_rank {
            return Err(anyhow!(
                "Adapter tensor shapes do not match: down {:?}, up {:?}",
                down.shape(),
                up.shape()
            ));
        }

        let (expected_rank, alpha, dropout) = match &adapter_config {
            Some(c) => (c.rank, c.alpha, c.dropout),
            None => (rank, alpha, 0.0),
        };
        if actual_rank != expected_rank {
            tracing::warn!(
                "Adapter rank {} differs from configured rank {}",
                actual_rank,
                expected_rank
            );
        }

        Ok(Self {
            down,
            up,
            scaling: alpha / actual_rank as f32,
            dropout,
        })
    }

    /// Apply the adapter at inference time
    pub fn apply(&self, hidden: &Tensor) -> Result<Tensor> {
        self.apply_t(hidden, false)
    }

    /// Apply the adapter, with branch dropout when `train` is set
    ///
    /// Accepts `[.., hidden]` shapes, so both pooled 2D tensors and full
    /// `[batch, seq, hidden]` activations work.
    pub fn apply_t(&self, hidden: &Tensor, train: bool) -> Result<Tensor> {
        let branch = if train && self.dropout > 0.0 {
            candle_nn::ops::dropout(hidden, self.dropout)?
        } else {
            hidden.clone()
        };

        let lora_out = branch
            .broadcast_matmul(&self.down.t()?)?
            .broadcast_matmul(&self.up.t()?)?;

        let scaled = (lora_out * self.scaling as f64)?;
        Ok((hidden + scaled)?)
    }

    /// Save adapter weights to a safetensors file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        // Move to CPU so saved adapters load on any device
        let down_cpu = self.down.to_device(&Device::Cpu)?;
        let up_cpu = self.up.to_device(&Device::Cpu)?;

        let mut tensors = std::collections::HashMap::new();
        tensors.insert("lora_projection.down".to_string(), down_cpu);
        tensors.insert("lora_projection.up".to_string(), up_cpu);

        candle_core::safetensors::save(&tensors, path.as_ref())?;
        Ok(())
    }

    /// Save weights and metadata as an adapter directory
    pub fn save_to_dir(&self, dir: impl AsRef<Path>, base_model: &str) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create adapter directory: {:?}", dir))?;

        self.save(dir.join("adapter.safetensors"))?;

        let config = AdapterConfig {
            rank: self.rank(),
            alpha: self.scaling * self.rank() as f32,
            dropout: self.dropout,
            base_model: base_model.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        config.save(dir.join("adapter_config.json"))?;

        tracing::info!("Saved adapter to {:?}", dir);
        Ok(())
    }

    pub fn rank(&self) -> usize {
        self.down.dims().first().copied().unwrap_or(0)
    }

    pub fn hidden_size(&self) -> usize {
        self.down.dims().get(1).copied().unwrap_or(0)
    }

    /// Trainable parameter count
    pub fn num_params(&self) -> usize {
        self.rank() * self.hidden_size() * 2
    }

    /// Stats relative to a base model parameter count
    pub fn stats(&self, base_params: usize) -> LoraStats {
        LoraStats::new(base_params + self.num_params(), self.num_params())
    }
}

/// Statistics about LoRA parameters
#[derive(Debug, Clone)]
pub struct LoraStats {
    /// Total parameters in the model
    pub total_params: usize,
    /// Trainable parameters (adapter only)
    pub trainable_params: usize,
    /// Percentage of trainable parameters
    pub trainable_percent: f64,
}

impl LoraStats {
    pub fn new(total: usize, trainable: usize) -> Self {
        Self {
            total_params: total,
            trainable_params: trainable,
            trainable_percent: trainable as f64 / total as f64 * 100.0,
        }
    }
}

impl std::fmt::Display for LoraStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LoRA: {}/{} params trainable ({:.4}%)",
            self.trainable_params, self.total_params, self.trainable_percent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lora_config_default() {
        let config = LoraConfig::default();
        assert_eq!(config.rank, 8);
        assert_eq!(config.alpha, 16.0);
        assert_eq!(config.scaling(), 2.0);
        assert_eq!(config.dropout, 0.1);
    }

    #[test]
    fn test_lora_config_custom() {
        let config = LoraConfig::new(16, 32.0).with_dropout(0.05);
        assert_eq!(config.rank, 16);
        assert_eq!(config.scaling(), 2.0);
        assert_eq!(config.dropout, 0.05);
    }

    #[test]
    fn test_fresh_adapter_is_identity() {
        let var_map = VarMap::new();
        let config = LoraConfig::new(4, 8.0).with_dropout(0.0);
        let projection = LoraProjection::new(&var_map, 16, &config, &Device::Cpu).unwrap();

        let hidden = Tensor::randn(0.0f32, 1.0, (2, 16), &Device::Cpu).unwrap();
        let output = projection.apply(&hidden).unwrap();

        // Up projection starts at zero, so the residual branch contributes nothing
        let input_vals: Vec<f32> = hidden.flatten_all().unwrap().to_vec1().unwrap();
        let output_vals: Vec<f32> = output.flatten_all().unwrap().to_vec1().unwrap();
        for (a, b) in input_vals.iter().zip(output_vals.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_apply_preserves_3d_shape() {
        let var_map = VarMap::new();
        let config = LoraConfig::new(4, 8.0);
        let projection = LoraProjection::new(&var_map, 16, &config, &Device::Cpu).unwrap();

        let hidden = Tensor::randn(0.0f32, 1.0, (2, 5, 16), &Device::Cpu).unwrap();
        let output = projection.apply(&hidden).unwrap();
        assert_eq!(output.dims(), &[2, 5, 16]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter_dir = dir.path().join("adapter");

        let var_map = VarMap::new();
        let config = LoraConfig::new(4, 8.0);
        let projection = LoraProjection::new(&var_map, 16, &config, &Device::Cpu).unwrap();
        projection.save_to_dir(&adapter_dir, "test-model").unwrap();

        let loaded = LoraProjection::load(&adapter_dir, 8, 16.0, &Device::Cpu).unwrap();
        assert_eq!(loaded.rank(), 4);
        assert_eq!(loaded.hidden_size(), 16);
        assert_eq!(loaded.num_params(), 4 * 16 * 2);

        let saved_config =
            AdapterConfig::from_file(adapter_dir.join("adapter_config.json")).unwrap();
        assert_eq!(saved_config.rank, 4);
        assert_eq!(saved_config.base_model, "test-model");
        assert!(!saved_config.created_at.is_empty());
    }

    #[test]
    fn test_lora_stats_display() {
        let stats = LoraStats::new(494_000_000, 14_336);
        assert!(stats.trainable_percent < 0.01);
        let rendered = format!("{}", stats);
        assert!(rendered.contains("14336"));
    }
}
