//! Text generation module
//!
//! Provides decoder-model inference for guidance generation:
//!
//! ```text
//! Prompt ──► Tokenizer ──► Qwen2 forward ──► [LoRA residual] ──► lm_head
//!                                │                                  │
//!                                └── KV cache ◄──── sampled token ◄─┘
//! ```
//!
//! The [`Generator`] trait abstracts over backends; [`CandleGenerator`] is
//! the Candle-based implementation. [`DeadlineRunner`] bounds how long a
//! single generation may run.

pub mod candle;
pub mod config;
pub mod deadline;
pub mod prompt;

pub use candle::CandleGenerator;
pub use config::{GeneratorConfig, SamplingParams};
pub use deadline::{DeadlineOutcome, DeadlineRunner};
pub use prompt::{
    chat_prompt, chat_transcript, situation_prompt, strip_artifacts, COORDINATOR_SYSTEM_PROMPT,
    EVALUATOR_SYSTEM_PROMPT,
};

use anyhow::Result;

/// Trait for text generators
pub trait Generator: Send + Sync {
    /// Generate a completion for the given prompt
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String>;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Maximum context length in tokens
    fn max_context_length(&self) -> usize;

    /// Count tokens in text
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

impl std::fmt::Debug for dyn Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("model_name", &self.model_name())
            .finish()
    }
}

/// Create a generator from config
pub fn create_generator(config: GeneratorConfig) -> Result<Box<dyn Generator>> {
    let generator = CandleGenerator::new(config)?;
    Ok(Box::new(generator))
}
