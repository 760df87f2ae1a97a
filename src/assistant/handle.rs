//! Generator lifecycle management
//!
//! Model loading takes tens of seconds on CPU and can fail outright
//! (missing weights, unsupported architecture). The handle makes that
//! one-time transition explicit: the first caller loads, concurrent
//! callers block on the init guard and observe the outcome, and a
//! failure is sticky so the process degrades to template answers
//! instead of re-running a broken load on every request.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, RwLock};

use crate::generation::{create_generator, Generator, GeneratorConfig};

/// Lifecycle state of the shared generator
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorState {
    /// No load attempted yet
    Uninitialized,
    /// A load is in progress
    Loading,
    /// The generator is available
    Ready,
    /// The load failed; the reason is kept for status reporting
    Failed(String),
}

impl GeneratorState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Load-once handle to the text generator
pub struct GeneratorHandle {
    config: GeneratorConfig,
    state: RwLock<GeneratorState>,
    generator: RwLock<Option<Arc<dyn Generator>>>,
    init_guard: Mutex<()>,
}

impl GeneratorHandle {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            state: RwLock::new(GeneratorState::Uninitialized),
            generator: RwLock::new(None),
            init_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> GeneratorState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(e) => GeneratorState::Failed(format!("State lock poisoned: {}", e)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// The loaded generator, if any
    pub fn generator(&self) -> Option<Arc<dyn Generator>> {
        self.generator.read().ok()?.clone()
    }

    /// Load the generator if nobody has, and return it.
    ///
    /// Exactly one caller performs the load; the rest wait on the init
    /// guard and then observe the recorded outcome. A previous failure
    /// short-circuits without retrying.
    pub fn ensure_ready(&self) -> Result<Arc<dyn Generator>> {
        if let Some(generator) = self.generator() {
            return Ok(generator);
        }

        let _guard = self
            .init_guard
            .lock()
            .map_err(|e| anyhow::anyhow!("Init lock poisoned: {}", e))?;

        // A concurrent caller may have finished while we waited
        match self.state() {
            GeneratorState::Ready => {
                return self
                    .generator()
                    .context("Generator marked ready but not present");
            }
            GeneratorState::Failed(reason) => {
                anyhow::bail!("Generator load previously failed: {}", reason);
            }
            _ => {}
        }

        self.set_state(GeneratorState::Loading);
        tracing::info!("Loading generator: {}", self.config.model_id);

        match create_generator(self.config.clone()) {
            Ok(generator) => {
                let generator: Arc<dyn Generator> = Arc::from(generator);
                if let Ok(mut slot) = self.generator.write() {
                    *slot = Some(Arc::clone(&generator));
                }
                self.set_state(GeneratorState::Ready);
                tracing::info!("Generator ready: {}", generator.model_name());
                Ok(generator)
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!("Generator load failed: {}", reason);
                self.set_state(GeneratorState::Failed(reason));
                Err(e)
            }
        }
    }

    /// Kick off the load on a background thread and return immediately.
    ///
    /// Used by the demo server to warm up on the first request while the
    /// page keeps polling `/status`. Spawning twice is harmless: the
    /// second load blocks on the init guard and short-circuits.
    pub fn begin_background_load(self: &Arc<Self>) {
        if self.state() != GeneratorState::Uninitialized {
            return;
        }
        let handle = Arc::clone(self);
        std::thread::spawn(move || {
            // Failures are recorded in the state and logged by ensure_ready
            let _ = handle.ensure_ready();
        });
    }

    fn set_state(&self, state: GeneratorState) {
        if let Ok(mut slot) = self.state.write() {
            *slot = state;
        }
    }
}
