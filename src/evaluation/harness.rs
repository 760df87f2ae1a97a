//! Scenario runner, scoring rubric, and summary report
//!
//! Scoring is keyword-based, 0-10 per scenario:
//! - up to 3 points for emergency-response vocabulary
//! - up to 3 points for actionable-guidance vocabulary
//! - up to 3 points for expected-element coverage (fractional)
//! - 1 point for a structured answer of reasonable length
//!
//! Crude, but stable across runs and good enough to catch a model that
//! regressed into generic or empty answers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

use crate::assistant::{EmergencyAssistant, ModelAttempt};
use crate::generation::{SamplingParams, EVALUATOR_SYSTEM_PROMPT};

use super::scenarios::{EvaluationScenario, SCENARIOS};

const EMERGENCY_TERMS: &[&str] = &[
    "emergency",
    "safety",
    "evacuation",
    "rescue",
    "protocol",
    "coordinate",
    "assess",
    "immediate",
];

const ACTION_TERMS: &[&str] = &[
    "step",
    "first",
    "next",
    "ensure",
    "establish",
    "contact",
    "deploy",
    "activate",
];

/// Outcome of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub category: String,
    pub scenario: String,
    pub response: String,
    pub quality_score: f64,
    pub generation_time: f64,
}

/// Score a response against a scenario's rubric, 0-10 with one decimal
pub fn score_response(response: &str, scenario: &EvaluationScenario) -> f64 {
    if response.len() < 20 {
        return 0.0;
    }

    let lower = response.to_lowercase();
    let mut score = 0.0;

    let emergency_hits = EMERGENCY_TERMS.iter().filter(|t| lower.contains(**t)).count();
    score += emergency_hits.min(3) as f64;

    let action_hits = ACTION_TERMS.iter().filter(|t| lower.contains(**t)).count();
    score += action_hits.min(3) as f64;

    if !scenario.expected_elements.is_empty() {
        let element_hits = scenario
            .expected_elements
            .iter()
            .filter(|e| lower.contains(**e))
            .count();
        score += element_hits as f64 / scenario.expected_elements.len() as f64 * 3.0;
    }

    if response.len() > 100 && (response.contains("1.") || lower.contains("step")) {
        score += 1.0;
    }

    ((score * 10.0).round() / 10.0).min(10.0)
}

/// Run every built-in scenario through the assistant's model path
pub fn run_scenarios(assistant: &EmergencyAssistant) -> Vec<ScenarioResult> {
    let total = SCENARIOS.len();
    println!("\nTesting {} emergency scenarios...", total);
    println!("{}", "=".repeat(50));

    let mut results = Vec::with_capacity(total);
    for (i, scenario) in SCENARIOS.iter().enumerate() {
        println!("\n[{}/{}] {}", i + 1, total, scenario.category);
        results.push(run_scenario(assistant, scenario));
    }
    results
}

fn run_scenario(assistant: &EmergencyAssistant, scenario: &EvaluationScenario) -> ScenarioResult {
    println!("{}", "-".repeat(40));
    println!("Scenario: {}", scenario.scenario);
    println!("\nGenerating emergency response...");

    let start = Instant::now();
    let attempt = assistant.try_model_with_system(
        EVALUATOR_SYSTEM_PROMPT,
        scenario.scenario,
        SamplingParams::evaluation(),
    );
    let (response, quality_score) = match attempt {
            ModelAttempt::Completed(text) | ModelAttempt::TooShort(text) => {
                let score = score_response(&text, scenario);
                (text, score)
            }
            ModelAttempt::TimedOut | ModelAttempt::Saturated => {
                ("Response generation timed out".to_string(), 0.0)
            }
            ModelAttempt::Errored(reason) => (format!("Generation error: {}", reason), 0.0),
            ModelAttempt::NotLoaded { .. } => ("Model not loaded".to_string(), 0.0),
        };
    let generation_time = start.elapsed().as_secs_f64();

    println!("\nEMERGENCY RESPONSE:");
    println!("{}", "=".repeat(40));
    println!("{}", response);
    println!("{}", "=".repeat(40));
    println!("Generation Time: {:.1}s", generation_time);
    println!("Response Quality Score: {}/10", quality_score);

    ScenarioResult {
        category: scenario.category.to_string(),
        scenario: scenario.scenario.to_string(),
        response,
        quality_score,
        generation_time,
    }
}

/// Print the summary table, distribution, and overall assessment
pub fn print_summary(results: &[ScenarioResult]) {
    println!("\n{}", "=".repeat(60));
    println!("EMERGENCY SCENARIOS TEST SUMMARY");
    println!("{}", "=".repeat(60));

    if results.is_empty() {
        println!("No scenarios were run");
        return;
    }

    let total = results.len();
    let avg_score = results.iter().map(|r| r.quality_score).sum::<f64>() / total as f64;
    let avg_time = results.iter().map(|r| r.generation_time).sum::<f64>() / total as f64;

    println!("Total Scenarios Tested: {}", total);
    println!("Average Quality Score: {:.1}/10", avg_score);
    println!("Average Generation Time: {:.1}s", avg_time);
    println!();

    let excellent = results.iter().filter(|r| r.quality_score >= 8.0).count();
    let good = results
        .iter()
        .filter(|r| (6.0..8.0).contains(&r.quality_score))
        .count();
    let fair = results
        .iter()
        .filter(|r| (4.0..6.0).contains(&r.quality_score))
        .count();
    let poor = results.iter().filter(|r| r.quality_score < 4.0).count();

    println!("Quality Distribution:");
    println!("  Excellent (8-10): {} scenarios", excellent);
    println!("  Good (6-7):       {} scenarios", good);
    println!("  Fair (4-5):       {} scenarios", fair);
    println!("  Poor (0-3):       {} scenarios", poor);

    println!("\nDetailed Results:");
    println!("{}", "-".repeat(60));
    for result in results {
        println!("{:<25} Score: {}/10", result.category, result.quality_score);
    }
    println!("{}", "=".repeat(60));
    println!("{}", overall_assessment(avg_score));
}

/// Deployment-readiness verdict for an average score
pub fn overall_assessment(avg_score: f64) -> &'static str {
    if avg_score >= 7.0 {
        "OVERALL ASSESSMENT: EXCELLENT - Ready for emergency deployment"
    } else if avg_score >= 5.0 {
        "OVERALL ASSESSMENT: GOOD - Suitable for most emergency scenarios"
    } else if avg_score >= 3.0 {
        "OVERALL ASSESSMENT: FAIR - Needs improvement for critical situations"
    } else {
        "OVERALL ASSESSMENT: POOR - Requires significant training enhancement"
    }
}

/// Write per-scenario rows to a CSV file
pub fn export_csv(results: &[ScenarioResult], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;

    for result in results {
        writer.serialize(result)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV file: {:?}", path))?;

    tracing::info!("Wrote {} scenario results to {:?}", results.len(), path);
    Ok(())
}
