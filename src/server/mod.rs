//! HTTP interfaces
//!
//! Two servers share one [`EmergencyAssistant`]:
//!
//! - [`api`] is the JSON guidance API (`/emergency-guidance`, `/health`,
//!   `/test`), meant for integrations.
//! - [`demo`] is a self-contained browser demo with an inline page that
//!   polls `/status` while the model warms up.

use std::sync::Arc;

use crate::assistant::EmergencyAssistant;

pub mod api;
pub mod demo;

pub use api::serve_api;
pub use demo::serve_demo;

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<EmergencyAssistant>,
}
