//! Built-in evaluation scenarios
//!
//! Eight realistic coordination situations covering the protocol
//! categories, each with the coverage elements a complete answer is
//! expected to mention.

/// A single evaluation scenario
#[derive(Debug, Clone)]
pub struct EvaluationScenario {
    /// Short category label used in reports
    pub category: &'static str,
    /// The situation handed to the model
    pub scenario: &'static str,
    /// Phrases a complete answer should touch on
    pub expected_elements: &'static [&'static str],
}

/// The built-in scenario suite
pub const SCENARIOS: &[EvaluationScenario] = &[
    EvaluationScenario {
        category: "Wildfire Response",
        scenario: "A fast-moving wildfire is approaching our residential area with 500 homes. \
                   Winds are gusting at 40 mph, and we have approximately 2 hours before the \
                   fire reaches the first houses. What immediate evacuation steps should we take?",
        expected_elements: &[
            "evacuation routes",
            "shelter locations",
            "communication",
            "transportation",
            "vulnerable populations",
        ],
    },
    EvaluationScenario {
        category: "Flood Emergency",
        scenario: "Heavy rainfall has caused the main river to overflow. Downtown area is \
                   flooding with 4 feet of water. 150 people are stranded in buildings. \
                   Emergency services are stretched thin. How do we coordinate rescue operations?",
        expected_elements: &[
            "rescue prioritization",
            "boat deployment",
            "safety protocols",
            "communication",
            "medical support",
        ],
    },
    EvaluationScenario {
        category: "Earthquake Response",
        scenario: "A 6.8 magnitude earthquake just struck our city. Multiple buildings have \
                   collapsed, power grid is down, and communication networks are failing. We \
                   have reports of people trapped in rubble. What's our immediate response \
                   protocol?",
        expected_elements: &[
            "search and rescue",
            "triage",
            "communication backup",
            "resource coordination",
            "safety assessment",
        ],
    },
    EvaluationScenario {
        category: "Mass Casualty Incident",
        scenario: "A major traffic accident on the highway involves 3 vehicles with 12 people \
                   injured, including 4 with critical injuries. Local hospital is 20 minutes \
                   away and has limited trauma capacity. How do we handle triage and transport?",
        expected_elements: &[
            "triage protocols",
            "transport priorities",
            "medical care",
            "scene safety",
            "resource allocation",
        ],
    },
    EvaluationScenario {
        category: "Hurricane Preparation",
        scenario: "A Category 4 hurricane will make landfall in 24 hours. Our coastal town has \
                   8,000 residents, many elderly. Mandatory evacuation has been ordered for \
                   flood zones. How do we execute the evacuation plan?",
        expected_elements: &[
            "evacuation zones",
            "transportation",
            "shelter management",
            "vulnerable populations",
            "communication",
        ],
    },
    EvaluationScenario {
        category: "Chemical Spill",
        scenario: "A tanker truck carrying hazardous chemicals has overturned on a major road \
                   near a school. Unknown chemical is leaking, and wind is blowing toward the \
                   residential area. 200 people need immediate evacuation. What are our steps?",
        expected_elements: &[
            "hazmat protocols",
            "evacuation perimeter",
            "decontamination",
            "medical monitoring",
            "air quality",
        ],
    },
    EvaluationScenario {
        category: "Winter Storm Response",
        scenario: "A severe blizzard has dumped 3 feet of snow in 8 hours. Power is out for \
                   15,000 residents, temperature is -10°F, and roads are impassable. Multiple \
                   people are calling for help with medical emergencies. How do we respond?",
        expected_elements: &[
            "warming centers",
            "emergency medical access",
            "power restoration",
            "welfare checks",
            "resource distribution",
        ],
    },
    EvaluationScenario {
        category: "Building Collapse",
        scenario: "A 5-story apartment building has partially collapsed during construction \
                   work nearby. An estimated 30 people may be trapped inside. Structural \
                   engineers warn the remaining structure is unstable. How do we approach \
                   rescue operations?",
        expected_elements: &[
            "structural assessment",
            "search and rescue",
            "safety zones",
            "heavy equipment",
            "medical teams",
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_suite_shape() {
        assert_eq!(SCENARIOS.len(), 8);

        let categories: HashSet<_> = SCENARIOS.iter().map(|s| s.category).collect();
        assert_eq!(categories.len(), 8);

        for scenario in SCENARIOS {
            assert!(!scenario.scenario.is_empty());
            assert_eq!(scenario.expected_elements.len(), 5);
        }
    }
}
