//! Optimizer and learning rate schedule for adapter training

use anyhow::Result;
use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::optim::{Optimizer, ParamsAdamW};
use candle_nn::VarMap;

/// AdamW optimizer configuration
#[derive(Debug, Clone)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
    }
}

/// AdamW optimizer wrapper
pub struct AdamW {
    inner: candle_nn::optim::AdamW,
    vars: Vec<Var>,
    config: AdamWConfig,
    step_count: usize,
}

impl AdamW {
    /// Create a new AdamW over all vars in the map
    pub fn new(var_map: &VarMap, config: AdamWConfig) -> Result<Self> {
        let params = ParamsAdamW {
            lr: config.lr,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.eps,
            weight_decay: config.weight_decay,
        };

        let vars = var_map.all_vars();
        let inner = candle_nn::optim::AdamW::new(vars.clone(), params)?;

        Ok(Self {
            inner,
            vars,
            config,
            step_count: 0,
        })
    }

    /// Perform an optimization step
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.inner.step(grads)?;
        self.step_count += 1;
        Ok(())
    }

    /// Step with gradient norm clipping, returning the pre-clip norm
    ///
    /// The grad store cannot be mutated, so clipping scales the step size
    /// for this update instead of rewriting the gradients.
    pub fn step_with_clipping(&mut self, grads: &GradStore, max_norm: f64) -> Result<f64> {
        let norm = compute_grad_norm(grads, &self.vars)?;

        if norm > max_norm {
            let coef = max_norm / (norm + 1e-6);
            let lr = self.config.lr;
            self.inner.set_learning_rate(lr * coef);
            self.inner.step(grads)?;
            self.inner.set_learning_rate(lr);
        } else {
            self.inner.step(grads)?;
        }

        self.step_count += 1;
        Ok(norm)
    }

    /// Get current learning rate
    pub fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    /// Set learning rate
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
        self.inner.set_learning_rate(lr);
    }

    /// Get step count
    pub fn step_count(&self) -> usize {
        self.step_count
    }
}

/// L2 norm across all tracked gradients
pub fn compute_grad_norm(grads: &GradStore, vars: &[Var]) -> Result<f64> {
    let mut total_norm_sq: f64 = 0.0;

    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            let grad_norm_sq = grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
            total_norm_sq += grad_norm_sq as f64;
        }
    }

    Ok(total_norm_sq.sqrt())
}

/// Linear warmup followed by cosine decay
pub struct LearningRateScheduler {
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
}

impl LearningRateScheduler {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            base_lr,
            warmup_steps,
            total_steps,
            current_step: 0,
        }
    }

    /// Learning rate for the current step
    pub fn get_lr(&self) -> f64 {
        if self.current_step < self.warmup_steps {
            self.base_lr * (self.current_step as f64 / self.warmup_steps.max(1) as f64)
        } else {
            let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1);
            let progress = (self.current_step - self.warmup_steps) as f64 / decay_steps as f64;
            let progress = progress.min(1.0);
            let decay = 0.5 * (1.0 + (std::f64::consts::PI * progress).cos());
            self.base_lr * decay
        }
    }

    /// Advance one step and return the new learning rate
    pub fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.get_lr()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lr_scheduler_warmup() {
        let mut scheduler = LearningRateScheduler::new(1e-4, 100, 1000);
        assert_eq!(scheduler.get_lr(), 0.0);

        // Halfway through warmup
        for _ in 0..50 {
            scheduler.step();
        }
        assert!((scheduler.get_lr() - 0.5e-4).abs() < 1e-9);
    }

    #[test]
    fn test_lr_scheduler_cosine_decay() {
        let mut scheduler = LearningRateScheduler::new(1e-4, 0, 1000);

        assert!((scheduler.get_lr() - 1e-4).abs() < 1e-10);

        for _ in 0..500 {
            scheduler.step();
        }
        assert!((scheduler.get_lr() - 0.5e-4).abs() < 1e-6);

        for _ in 0..500 {
            scheduler.step();
        }
        assert!(scheduler.get_lr() < 1e-8);
    }

    #[test]
    fn test_lr_scheduler_past_end_stays_at_floor() {
        let mut scheduler = LearningRateScheduler::new(1e-4, 10, 20);
        for _ in 0..50 {
            scheduler.step();
        }
        assert!(scheduler.get_lr() >= 0.0);
        assert!(scheduler.get_lr() < 1e-8);
    }
}
