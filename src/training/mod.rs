//! LoRA fine-tuning on Candle
//!
//! Fine-tunes a Qwen2 base model for emergency coordination guidance by
//! training a low-rank residual on top of the final hidden states. The
//! base weights stay frozen; only the adapter parameters receive
//! gradients, which keeps the whole run feasible on a laptop CPU.
//!
//! # Modules
//!
//! - `device` - CPU/CUDA/Metal device selection
//! - `hub` - HuggingFace Hub downloads and model path resolution
//! - `tokenizer` - tokenizer loading, padding, truncation
//! - `model` - Qwen2 causal LM with the LoRA residual attached
//! - `lora` - the adapter itself (projection, save/load, stats)
//! - `loss` - next-token cross-entropy with padding masked out
//! - `optimizer` - AdamW plus warmup/cosine schedule
//! - `dataset` - instruction/response pairs from JSON or JSONL
//! - `trainer` - the loop tying it all together

pub mod config;
pub mod dataset;
pub mod device;
pub mod hub;
pub mod lora;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod tokenizer;
pub mod trainer;

// Re-exports
pub use config::TrainingConfig;
pub use dataset::{Batched, BatchIterator, DatasetConfig, DatasetStats, TrainingDataset, TrainingExample};
pub use device::{device_label, select_device, DevicePreference};
pub use hub::{HubApi, HubModelConfig, ModelLoader, ModelPath};
pub use lora::{AdapterConfig, LoraConfig, LoraProjection, LoraStats};
pub use loss::{causal_lm_loss, perplexity};
pub use model::{base_param_count, load_lm_head, CausalLmLora};
pub use optimizer::{AdamW, AdamWConfig, LearningRateScheduler};
pub use tokenizer::{EncodedInput, TokenizerWrapper};
pub use trainer::{Trainer, TrainingMetrics, TrainingResult};
