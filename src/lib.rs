//! # Emergency Relief Assistant (era)
//!
//! Emergency response guidance that always answers. Expert protocol
//! templates deliver an immediate plan for any situation; a locally
//! fine-tuned language model enriches them whenever it can beat its
//! deadline.
//!
//! ## Overview
//!
//! - Situation triage: category, urgency, and extracted details
//! - Expert protocol templates for every supported emergency category
//! - Local Qwen2 inference through Candle, with optional LoRA adapters
//! - Deadline-bounded generation with graceful template fallback
//! - LoRA fine-tuning on instruction/response data
//! - Scenario-based quality evaluation
//! - REST API and browser demo built on Axum
//!
//! ## Architecture
//!
//! The crate is organized into modular components:
//!
//! - `triage` - classification, detail extraction, protocol templates
//! - `generation` - Candle-backed text generation and prompt building
//! - `assistant` - the orchestration layer every surface shares
//! - `server` - guidance API and browser demo
//! - `training` - LoRA fine-tuning with Candle
//! - `evaluation` - scenario harness and response scoring
//! - `diagnostics` - setup validation and model smoke tests
//! - `cli` - command-line interface

// Core modules
pub mod assistant;
pub mod cli;
pub mod diagnostics;
pub mod evaluation;
pub mod generation;
pub mod server;
pub mod training;
pub mod triage;

// Re-export commonly used types
pub use anyhow::{Error, Result};
