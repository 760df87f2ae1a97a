//! Scenario-based quality evaluation
//!
//! Runs a fixed suite of disaster scenarios through the model and scores
//! each response with a keyword rubric.

pub mod harness;
pub mod scenarios;

// Re-exports
pub use harness::{
    export_csv, overall_assessment, print_summary, run_scenarios, score_response, ScenarioResult,
};
pub use scenarios::{EvaluationScenario, SCENARIOS};
