//! Situation detail extraction
//!
//! Pulls optional structured fields (timeframe, affected population,
//! location, severity) out of free-text input. Each field has an ordered
//! list of regex alternatives; the first alternative that matches supplies
//! the field as the whole matched text, and unmatched fields stay absent.
//! Pure text annotation, no state.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Details extracted from a situation description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SituationDetails {
    pub timeframe: Option<String>,
    pub population: Option<String>,
    pub location: Option<String>,
    pub severity: Option<String>,
}

impl SituationDetails {
    /// True when no field matched
    pub fn is_empty(&self) -> bool {
        self.timeframe.is_none()
            && self.population.is_none()
            && self.location.is_none()
            && self.severity.is_none()
    }
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid pattern {p}: {e}")))
        .collect()
}

// Alternatives are word-bounded so "downtown" is reported as downtown rather
// than consumed as "town" by the place-word alternative.
static TIMEFRAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)\b(\d+)\s*(hour|hr|minute|min|day)s?\b",
        r"(?i)\b(immediately|urgent|now|asap)\b",
        r"(?i)\b(within|in)\s*(\d+)\s*(hour|minute|day)s?\b",
    ])
});

static POPULATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)\b(\d+)\s*(people|person|resident|individual|student|patient|worker)s?\b",
        r"(?i)\b(school|hospital|building|community)\b",
        r"(?i)\b(hundreds?|thousands?|dozen|many|several)\b",
    ])
});

static LOCATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)\b(town|city|community|neighborhood|school|hospital|highway|building)\b",
        r"(?i)\b(\d+)\s*(mile|km|block)s?\s*(away|from)\b",
        r"(?i)\b(downtown|residential|coastal|rural|urban)\b",
    ])
});

static SEVERITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)\b(major|massive|severe|critical|catastrophic)\b",
        r"(?i)\b(minor|small|limited|contained)\b",
        r"(?i)\b(category\s*\d+|magnitude\s*\d+|\d+\.\d+\s*magnitude)\b",
    ])
});

fn first_match(patterns: &[Regex], input: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.find(input).map(|m| m.as_str().to_string()))
}

/// Extract whatever details the input mentions
pub fn extract_details(input: &str) -> SituationDetails {
    SituationDetails {
        timeframe: first_match(&TIMEFRAME_PATTERNS, input),
        population: first_match(&POPULATION_PATTERNS, input),
        location: first_match(&LOCATION_PATTERNS, input),
        severity: first_match(&SEVERITY_PATTERNS, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_extraction() {
        let details = extract_details("Wildfire in 2 hours, 500 residents, downtown");

        assert_eq!(details.timeframe.as_deref(), Some("2 hours"));
        assert_eq!(details.population.as_deref(), Some("500 residents"));
        assert_eq!(details.location.as_deref(), Some("downtown"));
        assert_eq!(details.severity, None);
    }

    #[test]
    fn test_no_details() {
        let details = extract_details("help");
        assert!(details.is_empty());
    }

    #[test]
    fn test_timeframe_alternatives() {
        assert_eq!(
            extract_details("evacuate immediately").timeframe.as_deref(),
            Some("immediately")
        );
        assert_eq!(
            extract_details("needs help within 3 days").timeframe.as_deref(),
            Some("3 days")
        );
    }

    #[test]
    fn test_population_alternatives() {
        assert_eq!(
            extract_details("15 workers potentially trapped")
                .population
                .as_deref(),
            Some("15 workers")
        );
        assert_eq!(
            extract_details("spill near the school").population.as_deref(),
            Some("school")
        );
        assert_eq!(
            extract_details("hundreds displaced").population.as_deref(),
            Some("hundreds")
        );
    }

    #[test]
    fn test_severity_alternatives() {
        assert_eq!(
            extract_details("severe damage reported").severity.as_deref(),
            Some("severe")
        );
        assert_eq!(
            extract_details("Category 3 approaching").severity.as_deref(),
            Some("Category 3")
        );
        assert_eq!(
            extract_details("6.2 magnitude quake").severity.as_deref(),
            Some("6.2 magnitude")
        );
    }

    #[test]
    fn test_first_pattern_wins_per_field() {
        // "5 miles from town": the place word outranks the distance pattern
        let details = extract_details("shelter 5 miles from town");
        assert_eq!(details.location.as_deref(), Some("town"));
    }

    #[test]
    fn test_case_insensitive() {
        let details = extract_details("MAJOR flooding DOWNTOWN, 50 PEOPLE stranded");
        assert_eq!(details.severity.as_deref(), Some("MAJOR"));
        assert_eq!(details.location.as_deref(), Some("DOWNTOWN"));
        assert_eq!(details.population.as_deref(), Some("50 PEOPLE"));
    }
}
