//! Guidance report assembly
//!
//! Builds the user-facing response block: extracted detail lines, an
//! optional model-generated preamble, the protocol title with numbered
//! steps, and the fixed closing checklist. Pure string concatenation,
//! deterministic given its inputs.

use super::protocols::protocol;
use super::{EmergencyCategory, SituationDetails};

/// Closing checklist appended to every report
const ONGOING_ACTIONS: &[&str] = &[
    "Continuously reassess situation as it develops",
    "Maintain clear communication with all responders",
    "Document all actions for after-action review",
    "Request additional resources early if needed",
    "Follow established incident command protocols",
];

/// Render the full guidance report for a category.
///
/// Layout: present detail lines, optional `AI GUIDANCE` preamble, protocol
/// title and rule, numbered steps (width-2 index), then `ONGOING ACTIONS`.
pub fn render_report(
    category: EmergencyCategory,
    details: &SituationDetails,
    ai_guidance: Option<&str>,
) -> String {
    let proto = protocol(category);
    let mut lines: Vec<String> = Vec::new();

    if let Some(timeframe) = &details.timeframe {
        lines.push(format!("TIMEFRAME: {}", timeframe));
    }
    if let Some(population) = &details.population {
        lines.push(format!("AFFECTED: {}", population));
    }
    if let Some(location) = &details.location {
        lines.push(format!("LOCATION: {}", location));
    }
    if let Some(severity) = &details.severity {
        lines.push(format!("SEVERITY: {}", severity));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    if let Some(guidance) = ai_guidance {
        lines.push(format!("AI GUIDANCE: {}", guidance));
        lines.push(String::new());
    }

    lines.push(proto.title.to_string());
    lines.push("=".repeat(50));
    for (i, step) in proto.steps.iter().enumerate() {
        lines.push(format!("{:2}. {}", i + 1, step));
    }

    lines.push(String::new());
    lines.push("ONGOING ACTIONS:".to_string());
    for action in ONGOING_ACTIONS {
        lines.push(format!("   \u{2022} {}", action));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::extract_details;

    #[test]
    fn test_layout_details_then_title_then_steps() {
        let details = extract_details("Wildfire in 2 hours, 500 residents, downtown");
        let report = render_report(EmergencyCategory::Wildfire, &details, None);
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "TIMEFRAME: 2 hours");
        assert_eq!(lines[1], "AFFECTED: 500 residents");
        assert_eq!(lines[2], "LOCATION: downtown");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "WILDFIRE EVACUATION PROTOCOL");
        assert_eq!(lines[5], "=".repeat(50));

        let proto = protocol(EmergencyCategory::Wildfire);
        let numbered = &lines[6..6 + proto.steps.len()];
        assert_eq!(numbered.len(), proto.steps.len());
        assert!(numbered[0].starts_with(" 1. "));
        assert!(numbered[7].starts_with(" 8. "));

        assert_eq!(lines[6 + proto.steps.len()], "");
        assert_eq!(lines[7 + proto.steps.len()], "ONGOING ACTIONS:");
    }

    #[test]
    fn test_no_details_starts_with_title() {
        let report = render_report(
            EmergencyCategory::General,
            &SituationDetails::default(),
            None,
        );
        assert!(report.starts_with("GENERAL EMERGENCY RESPONSE PROTOCOL"));
    }

    #[test]
    fn test_ai_preamble_precedes_title() {
        let report = render_report(
            EmergencyCategory::Flood,
            &SituationDetails::default(),
            Some("Prioritize boat rescue of stranded residents."),
        );
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            lines[0],
            "AI GUIDANCE: Prioritize boat rescue of stranded residents."
        );
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "FLOOD EMERGENCY RESPONSE PROTOCOL");
    }

    #[test]
    fn test_checklist_is_fixed() {
        let report = render_report(
            EmergencyCategory::Earthquake,
            &SituationDetails::default(),
            None,
        );
        assert!(report.ends_with("Follow established incident command protocols"));
        assert_eq!(report.matches('\u{2022}').count(), 5);
    }

    #[test]
    fn test_deterministic() {
        let details = extract_details("chemical spill near school, 200 people");
        let a = render_report(EmergencyCategory::Chemical, &details, None);
        let b = render_report(EmergencyCategory::Chemical, &details, None);
        assert_eq!(a, b);
    }
}
