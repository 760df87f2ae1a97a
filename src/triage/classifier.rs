//! Keyword-based emergency categorization
//!
//! Maps free-text situation descriptions onto a closed set of emergency
//! categories. Matching is a single case-insensitive pass over per-category
//! keyword lists in a fixed priority order with early exit; there is no
//! scoring or tie-breaking beyond that order.

use serde::{Deserialize, Serialize};

/// Emergency categories recognized by the triage core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyCategory {
    Wildfire,
    Flood,
    Earthquake,
    MassCasualty,
    Chemical,
    Hurricane,
    General,
}

impl EmergencyCategory {
    /// Stable lowercase tag (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wildfire => "wildfire",
            Self::Flood => "flood",
            Self::Earthquake => "earthquake",
            Self::MassCasualty => "mass_casualty",
            Self::Chemical => "chemical",
            Self::Hurricane => "hurricane",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for EmergencyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EmergencyCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "wildfire" => Ok(Self::Wildfire),
            "flood" => Ok(Self::Flood),
            "earthquake" => Ok(Self::Earthquake),
            "mass_casualty" | "mass-casualty" => Ok(Self::MassCasualty),
            "chemical" => Ok(Self::Chemical),
            "hurricane" => Ok(Self::Hurricane),
            "general" => Ok(Self::General),
            _ => Err(anyhow::anyhow!(
                "Unknown emergency category: {}. Valid: wildfire, flood, earthquake, \
                 mass_casualty, chemical, hurricane, general",
                s
            )),
        }
    }
}

/// Keyword lists probed in priority order; the first category with a hit wins.
/// Note "storm surge" sits under flood, ahead of hurricane's bare "storm".
const CATEGORY_KEYWORDS: &[(EmergencyCategory, &[&str])] = &[
    (
        EmergencyCategory::Wildfire,
        &["fire", "wildfire", "blaze", "burn", "smoke", "flame"],
    ),
    (
        EmergencyCategory::Flood,
        &["flood", "water", "rain", "dam", "river", "storm surge"],
    ),
    (
        EmergencyCategory::Earthquake,
        &["earthquake", "quake", "shake", "collapse", "seismic"],
    ),
    (
        EmergencyCategory::MassCasualty,
        &["accident", "crash", "casualty", "injured", "victims", "wounded"],
    ),
    (
        EmergencyCategory::Chemical,
        &["chemical", "spill", "hazmat", "toxic", "gas", "leak"],
    ),
    (
        EmergencyCategory::Hurricane,
        &["hurricane", "typhoon", "cyclone", "storm"],
    ),
];

/// Classify a situation description into an emergency category.
///
/// Case-insensitive substring match; returns [`EmergencyCategory::General`]
/// when no keyword from any category appears.
pub fn classify(input: &str) -> EmergencyCategory {
    let input = input.to_lowercase();

    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| input.contains(kw)) {
            return *category;
        }
    }

    EmergencyCategory::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildfire_keywords() {
        for input in [
            "Fire spreading toward the ridge",
            "wildfire approaching town",
            "A blaze broke out at the mill",
            "heavy smoke over the valley",
        ] {
            assert_eq!(classify(input), EmergencyCategory::Wildfire, "{}", input);
        }
    }

    #[test]
    fn test_no_keyword_falls_back_to_general() {
        assert_eq!(
            classify("Something bad happened downtown"),
            EmergencyCategory::General
        );
        assert_eq!(classify(""), EmergencyCategory::General);
    }

    #[test]
    fn test_priority_order() {
        // Wildfire outranks flood when both match
        assert_eq!(
            classify("fire near the river"),
            EmergencyCategory::Wildfire
        );
        // "storm surge" resolves to flood before hurricane sees "storm"
        assert_eq!(
            classify("storm surge hitting the coast"),
            EmergencyCategory::Flood
        );
        assert_eq!(classify("storm approaching"), EmergencyCategory::Hurricane);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            classify("EARTHQUAKE damaged the bridge"),
            EmergencyCategory::Earthquake
        );
        assert_eq!(
            classify("HazMat crew requested"),
            EmergencyCategory::Chemical
        );
    }

    #[test]
    fn test_deterministic() {
        let input = "Bus crash with 25 injured on the highway";
        assert_eq!(classify(input), classify(input));
        assert_eq!(classify(input), EmergencyCategory::MassCasualty);
    }

    #[test]
    fn test_category_round_trip() {
        for category in [
            EmergencyCategory::Wildfire,
            EmergencyCategory::MassCasualty,
            EmergencyCategory::General,
        ] {
            let parsed: EmergencyCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }
}
