//! Environment and model diagnostics
//!
//! Two entry points: [`validate_setup`] checks that everything a training
//! run needs is in place, and [`diagnose_model`] walks the inference stack
//! stage by stage to localize load and shape failures.

pub mod doctor;
pub mod model;

pub use doctor::validate_setup;
pub use model::diagnose_model;
