//! Training loop for LoRA fine-tuning
//!
//! Drives gradient accumulation, learning rate scheduling, periodic
//! checkpointing, and evaluation over a [`TrainingDataset`]. The heavy
//! lifting (forward pass, loss, optimizer math) lives in the sibling
//! modules; this one sequences them.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use super::config::TrainingConfig;
use super::dataset::{Batched, TrainingDataset, TrainingExample};
use super::loss::{causal_lm_loss, perplexity};
use super::model::CausalLmLora;
use super::optimizer::{AdamW, AdamWConfig, LearningRateScheduler};
use super::tokenizer::TokenizerWrapper;
use crate::generation::prompt::{chat_transcript, COORDINATOR_SYSTEM_PROMPT};

/// Training metrics
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Loss of the most recent optimization step
    pub train_loss: f64,
    /// Number of optimization steps taken
    pub global_step: usize,
    /// Current epoch (1-based)
    pub epoch: usize,
    /// Samples per second since training started
    pub samples_per_second: f64,
    /// Current learning rate
    pub learning_rate: f64,
}

impl std::fmt::Display for TrainingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Step {} | Epoch {} | Loss: {:.4} | LR: {:.2e} | {:.1} samples/s",
            self.global_step,
            self.epoch,
            self.train_loss,
            self.learning_rate,
            self.samples_per_second
        )
    }
}

/// Outcome of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final metrics snapshot
    pub metrics: TrainingMetrics,
    /// Where the adapter was saved, if training produced one
    pub adapter_path: Option<String>,
    /// Per-step loss history
    pub history: Vec<f64>,
}

/// High-level trainer
///
/// Owns the [`VarMap`] holding the trainable adapter parameters; the
/// model is created against it so the optimizer and checkpointing see
/// the same variables.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    var_map: VarMap,
}

impl Trainer {
    pub fn new(config: TrainingConfig, device: Device) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            var_map: VarMap::new(),
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The variable map the model's trainable parameters must be registered in
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    /// Build the optimizer over all registered trainable variables
    pub fn create_optimizer(&self) -> Result<AdamW> {
        AdamW::new(
            &self.var_map,
            AdamWConfig {
                lr: self.config.learning_rate,
                weight_decay: self.config.weight_decay,
                ..Default::default()
            },
        )
    }

    /// Build the warmup + cosine decay schedule for a run of `total_steps`
    pub fn create_scheduler(&self, total_steps: usize) -> LearningRateScheduler {
        let warmup = self.config.warmup_steps.min(total_steps);
        LearningRateScheduler::new(self.config.learning_rate, warmup, total_steps)
    }

    /// Run the full training loop
    ///
    /// The model must have been created against [`Trainer::var_map`],
    /// otherwise the optimizer has nothing to update.
    pub fn train(
        &mut self,
        model: &CausalLmLora,
        tokenizer: &TokenizerWrapper,
        dataset: &TrainingDataset,
        eval_dataset: Option<&TrainingDataset>,
    ) -> Result<TrainingResult> {
        if dataset.is_empty() {
            anyhow::bail!("Cannot train on an empty dataset");
        }

        let batch_size = self.config.batch_size;
        let accumulation_steps = self.config.gradient_accumulation_steps;
        let batches_per_epoch = dataset.len().div_ceil(batch_size);
        let total_batches = batches_per_epoch * self.config.num_epochs;
        let total_steps = (total_batches / accumulation_steps).max(1);

        let mut optimizer = self.create_optimizer()?;
        let mut scheduler = self.create_scheduler(total_steps);

        tracing::info!("Starting training");
        tracing::info!("  Examples: {}", dataset.len());
        tracing::info!("  Epochs: {}", self.config.num_epochs);
        tracing::info!(
            "  Batch size: {} (effective: {})",
            batch_size,
            self.config.effective_batch_size()
        );
        tracing::info!("  Total optimization steps: {}", total_steps);
        tracing::info!("  Max sequence length: {}", self.config.max_length);
        tracing::info!("  {}", model.stats());

        let mut metrics = TrainingMetrics {
            learning_rate: self.config.learning_rate,
            ..Default::default()
        };
        let mut history = Vec::new();
        // Losses are summed on-device and only materialized once per
        // optimization step, so accumulation adds no extra backward passes.
        let mut accumulated: Option<Tensor> = None;
        let mut accumulated_batches = 0usize;
        let mut samples_seen = 0usize;
        let train_start = Instant::now();

        for epoch in 0..self.config.num_epochs {
            metrics.epoch = epoch + 1;
            let epoch_start = Instant::now();
            let mut epoch_loss = 0.0;
            let mut epoch_batches = 0usize;
            let mut epoch_samples = 0usize;

            for batch in dataset.batches(batch_size) {
                let (input_ids, attention_mask) = self.batch_to_tensors(&batch, tokenizer)?;
                let logits = model.forward_logits(&input_ids, true)?;
                let loss = causal_lm_loss(&logits, &input_ids, &attention_mask)?;
                let loss_value = loss.to_scalar::<f32>()? as f64;

                epoch_loss += loss_value;
                epoch_batches += 1;
                epoch_samples += batch.len();
                samples_seen += batch.len();

                let scaled = (loss / accumulation_steps as f64)?;
                accumulated = Some(match accumulated.take() {
                    Some(acc) => (&acc + &scaled)?,
                    None => scaled,
                });
                accumulated_batches += 1;

                if accumulated_batches < accumulation_steps {
                    continue;
                }

                if let Some(acc) = accumulated.take() {
                    self.optimization_step(&acc, &mut optimizer, &mut scheduler)?;
                }
                accumulated_batches = 0;

                metrics.global_step += 1;
                metrics.train_loss = loss_value;
                metrics.learning_rate = optimizer.learning_rate();
                let elapsed = train_start.elapsed().as_secs_f64();
                metrics.samples_per_second = if elapsed > 0.0 {
                    samples_seen as f64 / elapsed
                } else {
                    0.0
                };
                history.push(loss_value);

                if self.config.logging_steps > 0
                    && metrics.global_step % self.config.logging_steps == 0
                {
                    println!("{}", metrics);
                    std::io::stdout().flush().ok();
                }

                if self.config.save_steps > 0 && metrics.global_step % self.config.save_steps == 0 {
                    self.save_checkpoint(metrics.global_step)?;
                }

                if self.config.eval_steps > 0 && metrics.global_step % self.config.eval_steps == 0 {
                    if let Some(eval) = eval_dataset {
                        let eval_loss = self.evaluate(model, tokenizer, eval)?;
                        tracing::info!(
                            "Eval at step {} | Loss: {:.4} | Perplexity: {:.2}",
                            metrics.global_step,
                            eval_loss,
                            perplexity(eval_loss)
                        );
                    }
                }
            }

            let avg_loss = if epoch_batches > 0 {
                epoch_loss / epoch_batches as f64
            } else {
                0.0
            };
            tracing::info!(
                "Epoch {} completed in {:.1}s | Avg loss: {:.4} | Samples: {}",
                epoch + 1,
                epoch_start.elapsed().as_secs_f64(),
                avg_loss,
                epoch_samples
            );
        }

        // Leftover partial accumulation still carries gradients.
        if let Some(acc) = accumulated.take() {
            self.optimization_step(&acc, &mut optimizer, &mut scheduler)?;
            metrics.global_step += 1;
            metrics.learning_rate = optimizer.learning_rate();
        }

        let adapter_dir = Path::new(&self.config.output_dir).join("adapter");
        model
            .save_adapter(&adapter_dir, &self.config.model_path)
            .context("Failed to save trained adapter")?;

        tracing::info!(
            "Training complete in {:.1}s | Steps: {} | Final loss: {:.4}",
            train_start.elapsed().as_secs_f64(),
            metrics.global_step,
            metrics.train_loss
        );

        Ok(TrainingResult {
            metrics,
            adapter_path: Some(adapter_dir.to_string_lossy().into_owned()),
            history,
        })
    }

    /// Average loss over a held-out dataset, without dropout
    pub fn evaluate(
        &self,
        model: &CausalLmLora,
        tokenizer: &TokenizerWrapper,
        dataset: &TrainingDataset,
    ) -> Result<f64> {
        if dataset.is_empty() {
            tracing::warn!("Evaluation dataset is empty, skipping");
            return Ok(0.0);
        }

        let mut total_loss = 0.0;
        let mut num_batches = 0usize;
        for batch in dataset.batches(self.config.batch_size) {
            let (input_ids, attention_mask) = self.batch_to_tensors(&batch, tokenizer)?;
            let logits = model.forward_logits(&input_ids, false)?;
            let loss = causal_lm_loss(&logits, &input_ids, &attention_mask)?;
            total_loss += loss.to_scalar::<f32>()? as f64;
            num_batches += 1;
        }

        Ok(total_loss / num_batches as f64)
    }

    /// Backward pass plus one scheduled, clipped optimizer update
    ///
    /// The learning rate is advanced before the parameter update so the
    /// very first step already runs at the warmup rate.
    fn optimization_step(
        &self,
        loss: &Tensor,
        optimizer: &mut AdamW,
        scheduler: &mut LearningRateScheduler,
    ) -> Result<f64> {
        let grads = loss.backward()?;
        let lr = scheduler.step();
        optimizer.set_learning_rate(lr);
        let grad_norm = optimizer.step_with_clipping(&grads, self.config.max_grad_norm)?;
        if grad_norm > self.config.max_grad_norm {
            tracing::debug!(
                "Gradient norm {:.3} exceeded {:.1}, update scaled down",
                grad_norm,
                self.config.max_grad_norm
            );
        }
        Ok(grad_norm)
    }

    /// Tokenize a batch of examples into `(input_ids, attention_mask)` tensors
    ///
    /// Each example becomes a full chat transcript, so the model learns the
    /// end-of-turn token along with the response.
    fn batch_to_tensors(
        &self,
        batch: &[&TrainingExample],
        tokenizer: &TokenizerWrapper,
    ) -> Result<(Tensor, Tensor)> {
        let max_length = self.config.max_length;
        let mut ids = Vec::with_capacity(batch.len() * max_length);
        let mut mask = Vec::with_capacity(batch.len() * max_length);

        for example in batch {
            let text = chat_transcript(
                COORDINATOR_SYSTEM_PROMPT,
                &example.instruction,
                &example.response,
            );
            let encoded = tokenizer.encode_padded(&text, max_length)?;
            ids.extend_from_slice(&encoded.input_ids);
            mask.extend_from_slice(&encoded.attention_mask);
        }

        let shape = (batch.len(), max_length);
        let input_ids = Tensor::from_vec(ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(mask, shape, &self.device)?;
        Ok((input_ids, attention_mask))
    }

    fn save_checkpoint(&self, step: usize) -> Result<()> {
        let output_dir = Path::new(&self.config.output_dir);
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
        let path = output_dir.join(format!("checkpoint-{}.safetensors", step));
        self.var_map
            .save(&path)
            .with_context(|| format!("Failed to save checkpoint: {:?}", path))?;
        tracing::info!("Saved checkpoint to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_display() {
        let metrics = TrainingMetrics {
            train_loss: 2.34567,
            global_step: 10,
            epoch: 1,
            samples_per_second: 3.52,
            learning_rate: 1e-4,
        };
        let text = format!("{}", metrics);
        assert!(text.contains("Step 10"));
        assert!(text.contains("Epoch 1"));
        assert!(text.contains("Loss: 2.3457"));
        assert!(text.contains("1.00e-4"));
        assert!(text.contains("3.5 samples/s"));
    }

    #[test]
    fn test_scheduler_warmup_clamped_to_total_steps() {
        let config = TrainingConfig::default();
        let base_lr = config.learning_rate;
        let trainer = Trainer::new(config, Device::Cpu).unwrap();

        // Default warmup (20) exceeds this tiny run; after all 4 steps the
        // rate must have reached the peak rather than a fifth of it.
        let mut scheduler = trainer.create_scheduler(4);
        let mut lr = 0.0;
        for _ in 0..4 {
            lr = scheduler.step();
        }
        assert!((lr - base_lr).abs() < 1e-12);
    }

    #[test]
    fn test_optimizer_uses_configured_learning_rate() {
        let config = TrainingConfig {
            learning_rate: 5e-4,
            ..Default::default()
        };
        let trainer = Trainer::new(config, Device::Cpu).unwrap();
        let optimizer = trainer.create_optimizer().unwrap();
        assert!((optimizer.learning_rate() - 5e-4).abs() < 1e-12);
    }
}
