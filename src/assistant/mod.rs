//! Assistant orchestration
//!
//! Ties the triage core and the generator together behind one
//! [`EmergencyAssistant`] the CLI and both servers share. The
//! [`GeneratorHandle`] owns the load-once lifecycle so every surface
//! agrees on whether a model is available.

pub mod handle;
pub mod pipeline;

pub use handle::{GeneratorHandle, GeneratorState};
pub use pipeline::{AnswerMode, EmergencyAssistant, Guidance, GuidanceSource, ModelAttempt};
