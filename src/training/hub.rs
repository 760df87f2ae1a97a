//! HuggingFace Hub integration for model downloading
//!
//! Resolves model identifiers to local file sets, downloading from the Hub
//! when the identifier is not a local path. Handles both single-file and
//! sharded safetensors checkpoints.

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::Api;
use std::path::{Path, PathBuf};

/// HuggingFace Hub API wrapper
pub struct HubApi {
    api: Api,
}

impl HubApi {
    pub fn new() -> Result<Self> {
        let api = Api::new().context("Failed to initialize HuggingFace Hub API")?;
        Ok(Self { api })
    }

    /// Download a model from HuggingFace Hub
    ///
    /// Fetches config, weights, and tokenizer files. Sharded checkpoints are
    /// resolved through `model.safetensors.index.json`.
    pub fn download_model(&self, model_id: &str) -> Result<ModelPath> {
        tracing::info!("Fetching model from HuggingFace Hub: {}", model_id);

        let repo = self.api.model(model_id.to_string());

        let config_file = repo
            .get("config.json")
            .context("Failed to download config.json")?;

        let weight_files = if let Ok(single) = repo.get("model.safetensors") {
            tracing::debug!("Downloaded model.safetensors");
            vec![single]
        } else {
            let index_file = repo.get("model.safetensors.index.json").map_err(|_| {
                anyhow!(
                    "No safetensors weights found for {} (tried model.safetensors \
                     and model.safetensors.index.json)",
                    model_id
                )
            })?;
            let index: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&index_file)?)
                    .context("Failed to parse safetensors index")?;

            let mut files = Vec::new();
            for name in shard_names(&index)? {
                let path = repo
                    .get(&name)
                    .with_context(|| format!("Failed to download weight shard {}", name))?;
                tracing::debug!("Downloaded shard {}", name);
                files.push(path);
            }
            files
        };

        let tokenizer_file = repo.get("tokenizer.json").ok();
        let tokenizer_config_file = repo.get("tokenizer_config.json").ok();

        let model_dir = config_file
            .parent()
            .ok_or_else(|| anyhow!("Invalid config path"))?
            .to_path_buf();

        Ok(ModelPath {
            path: model_dir,
            model_id: model_id.to_string(),
            is_local: false,
            config_file,
            weight_files,
            tokenizer_file,
            tokenizer_config_file,
        })
    }

    /// Load config.json from a Hub model
    pub fn load_config(&self, model_id: &str) -> Result<HubModelConfig> {
        let model_path = self.download_model(model_id)?;
        HubModelConfig::from_file(&model_path.config_file)
    }
}

/// Unique shard file names from a safetensors index, in order
fn shard_names(index: &serde_json::Value) -> Result<Vec<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("Malformed safetensors index: missing weight_map"))?;

    let mut names: Vec<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        return Err(anyhow!("Safetensors index lists no weight files"));
    }
    Ok(names)
}

/// A resolved model: local directory plus the files the loaders need
#[derive(Debug, Clone)]
pub struct ModelPath {
    /// Root directory containing model files
    pub path: PathBuf,
    /// Original model ID or directory name
    pub model_id: String,
    /// Whether this came from a local path rather than the Hub
    pub is_local: bool,
    /// Path to config.json
    pub config_file: PathBuf,
    /// Safetensors weight files (one entry, or several for sharded models)
    pub weight_files: Vec<PathBuf>,
    /// Path to tokenizer.json, if present
    pub tokenizer_file: Option<PathBuf>,
    /// Path to tokenizer_config.json, if present
    pub tokenizer_config_file: Option<PathBuf>,
}

impl ModelPath {
    /// Create a ModelPath from a local directory
    pub fn from_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(anyhow!("Model directory does not exist: {:?}", path));
        }

        let config_file = path.join("config.json");
        if !config_file.exists() {
            return Err(anyhow!("config.json not found in {:?}", path));
        }

        let weight_files = collect_local_weights(&path)?;

        let tokenizer_file = path.join("tokenizer.json");
        let tokenizer_config_file = path.join("tokenizer_config.json");

        Ok(Self {
            model_id: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            path: path.clone(),
            is_local: true,
            config_file,
            weight_files,
            tokenizer_file: tokenizer_file.exists().then_some(tokenizer_file),
            tokenizer_config_file: tokenizer_config_file
                .exists()
                .then_some(tokenizer_config_file),
        })
    }

    /// Validate that all required files exist
    pub fn validate(&self) -> Result<()> {
        if !self.config_file.exists() {
            return Err(anyhow!("Config file not found: {:?}", self.config_file));
        }
        for file in &self.weight_files {
            if !file.exists() {
                return Err(anyhow!("Weights file not found: {:?}", file));
            }
        }
        Ok(())
    }
}

/// Find safetensors weights in a local model directory
fn collect_local_weights(dir: &Path) -> Result<Vec<PathBuf>> {
    let single = dir.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }

    let index = dir.join("model.safetensors.index.json");
    if index.exists() {
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&index)?)
            .context("Failed to parse model.safetensors.index.json")?;
        return shard_names(&parsed)?
            .into_iter()
            .map(|name| {
                let shard = dir.join(&name);
                if shard.exists() {
                    Ok(shard)
                } else {
                    Err(anyhow!("Weight shard listed in index is missing: {:?}", shard))
                }
            })
            .collect();
    }

    // No index: scan for shard-style names
    let mut shards: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension().map(|e| e == "safetensors").unwrap_or(false)
                && p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("model-"))
                    .unwrap_or(false)
        })
        .collect();
    shards.sort();

    if shards.is_empty() {
        return Err(anyhow!("No safetensors weights found in {:?}", dir));
    }
    Ok(shards)
}

/// Subset of a model's config.json used for compatibility checks
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,

    pub model_type: Option<String>,

    pub vocab_size: Option<usize>,

    pub hidden_size: Option<usize>,

    pub num_hidden_layers: Option<usize>,

    pub num_attention_heads: Option<usize>,

    pub num_key_value_heads: Option<usize>,

    pub intermediate_size: Option<usize>,

    pub max_position_embeddings: Option<usize>,

    /// Any extra fields we don't explicitly handle
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl HubModelConfig {
    /// Load config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        serde_json::from_str(&content).context("Failed to parse config.json")
    }

    /// Check if this is a Qwen2-family model
    pub fn is_qwen_family(&self) -> bool {
        if let Some(model_type) = &self.model_type {
            if model_type.to_lowercase().contains("qwen2") {
                return true;
            }
        }
        self.architectures
            .iter()
            .any(|arch| arch.to_lowercase().contains("qwen2"))
    }

    /// Validate that this config is compatible with our Qwen2 implementation
    pub fn validate_qwen_compatibility(&self) -> Result<()> {
        if !self.is_qwen_family() {
            return Err(anyhow!(
                "Unsupported model architecture: {:?} (model_type: {:?}). Supported: qwen2",
                self.architectures,
                self.model_type
            ));
        }

        if self.hidden_size.is_none() {
            return Err(anyhow!("Config missing required field: hidden_size"));
        }

        if self.num_hidden_layers.is_none() {
            return Err(anyhow!("Config missing required field: num_hidden_layers"));
        }

        if self.vocab_size.is_none() {
            return Err(anyhow!("Config missing required field: vocab_size"));
        }

        Ok(())
    }
}

/// Model loader that handles both local and HuggingFace models
pub struct ModelLoader {
    hub: HubApi,
}

impl ModelLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            hub: HubApi::new()?,
        })
    }

    /// Resolve a model identifier, auto-detecting local vs HuggingFace
    ///
    /// Identifiers that exist on disk, or that start with `.`, `/`, or `~`,
    /// are treated as local paths. Everything else goes to the Hub.
    pub fn load_model_path(&self, model_id_or_path: &str) -> Result<ModelPath> {
        let local_path = Path::new(model_id_or_path);
        let is_local = local_path.exists()
            || model_id_or_path.starts_with('.')
            || model_id_or_path.starts_with('/')
            || model_id_or_path.starts_with('~');

        if is_local && local_path.exists() {
            tracing::info!("Loading model from local path: {}", model_id_or_path);
            ModelPath::from_local(model_id_or_path)
        } else if is_local {
            Err(anyhow!(
                "Local model path does not exist: {}",
                model_id_or_path
            ))
        } else {
            self.hub.download_model(model_id_or_path)
        }
    }

    /// Load config from a model (local or HuggingFace)
    pub fn load_config(&self, model_id_or_path: &str) -> Result<HubModelConfig> {
        let model_path = self.load_model_path(model_id_or_path)?;
        HubModelConfig::from_file(&model_path.config_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qwen_config_detection() {
        let config: HubModelConfig = serde_json::from_str(
            r#"{
                "architectures": ["Qwen2ForCausalLM"],
                "model_type": "qwen2",
                "vocab_size": 151936,
                "hidden_size": 896,
                "num_hidden_layers": 24,
                "num_attention_heads": 14,
                "num_key_value_heads": 2,
                "intermediate_size": 4864,
                "max_position_embeddings": 32768
            }"#,
        )
        .unwrap();

        assert!(config.is_qwen_family());
        assert!(config.validate_qwen_compatibility().is_ok());
    }

    #[test]
    fn test_non_qwen_config_rejected() {
        let config: HubModelConfig = serde_json::from_str(
            r#"{"architectures": ["BertForMaskedLM"], "model_type": "bert"}"#,
        )
        .unwrap();

        assert!(!config.is_qwen_family());
        assert!(config.validate_qwen_compatibility().is_err());
    }

    #[test]
    fn test_shard_names_sorted_and_deduped() {
        let index: serde_json::Value = serde_json::from_str(
            r#"{
                "weight_map": {
                    "model.layers.1.weight": "model-00002-of-00002.safetensors",
                    "model.layers.0.weight": "model-00001-of-00002.safetensors",
                    "model.embed_tokens.weight": "model-00001-of-00002.safetensors"
                }
            }"#,
        )
        .unwrap();

        let names = shard_names(&index).unwrap();
        assert_eq!(
            names,
            vec![
                "model-00001-of-00002.safetensors".to_string(),
                "model-00002-of-00002.safetensors".to_string()
            ]
        );
    }

    #[test]
    fn test_from_local_missing_dir() {
        let result = ModelPath::from_local("/nonexistent/model/dir");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_local_with_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();

        let model_path = ModelPath::from_local(dir.path()).unwrap();
        assert!(model_path.is_local);
        assert_eq!(model_path.weight_files.len(), 1);
        assert!(model_path.tokenizer_file.is_some());
        assert!(model_path.tokenizer_config_file.is_none());
        assert!(model_path.validate().is_ok());
    }
}
