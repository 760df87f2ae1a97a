//! Emergency response protocol library
//!
//! Static mapping from emergency category to a professional response
//! protocol (title plus ordered action steps). Built into the binary,
//! immutable, and the guaranteed fallback when no model is available.

use super::EmergencyCategory;

/// A response protocol: title plus ordered action steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub title: &'static str,
    pub steps: &'static [&'static str],
}

static WILDFIRE: Protocol = Protocol {
    title: "WILDFIRE EVACUATION PROTOCOL",
    steps: &[
        "IMMEDIATE (0-30 min): Sound evacuation alarms, activate emergency broadcast system",
        "EVACUATION ROUTES: Open all designated routes, deploy traffic control personnel",
        "VULNERABLE POPULATIONS: Priority evacuation for elderly, disabled, hospitals, schools",
        "TRANSPORTATION: Deploy all available buses, coordinate with transport services",
        "SHELTER: Activate pre-designated evacuation centers, ensure adequate capacity",
        "COMMUNICATION: Maintain regular updates via radio, mobile alerts, social media",
        "SAFETY: Ensure all evacuation routes remain clear of fire danger zones",
        "RESOURCES: Request mutual aid from neighboring jurisdictions if needed",
    ],
};

static FLOOD: Protocol = Protocol {
    title: "FLOOD EMERGENCY RESPONSE PROTOCOL",
    steps: &[
        "IMMEDIATE RESCUE: Deploy boats/high-clearance vehicles to stranded locations",
        "EVACUATION: Move people to higher ground, use vertical evacuation if horizontal not possible",
        "COMMUNICATION: Establish emergency communication center with backup systems",
        "MEDICAL: Set up triage areas on high ground, ensure medical access routes",
        "UTILITIES: Shut off electricity to flooded areas, monitor water supply safety",
        "COORDINATION: Deploy search and rescue teams systematically by zones",
        "SHELTER: Open emergency shelters with capacity for displaced persons",
        "MONITORING: Continuous monitoring of water levels and weather conditions",
    ],
};

static EARTHQUAKE: Protocol = Protocol {
    title: "EARTHQUAKE RESPONSE PROTOCOL",
    steps: &[
        "IMMEDIATE SAFETY: Check for injuries, implement aftershock precautions",
        "SEARCH AND RESCUE: Deploy teams to collapsed buildings using systematic grid search",
        "COMMUNICATION: Establish backup communication systems (amateur radio if needed)",
        "MEDICAL TRIAGE: Set up field hospitals, categorize injuries by severity (START triage)",
        "UTILITIES: Assess and shut off damaged gas lines, electrical hazards, water mains",
        "STRUCTURAL ASSESSMENT: Deploy engineers to assess building safety",
        "COORDINATION: Establish incident command center with unified command structure",
        "RESOURCES: Request specialized urban search and rescue teams",
    ],
};

static MASS_CASUALTY: Protocol = Protocol {
    title: "MASS CASUALTY INCIDENT PROTOCOL",
    steps: &[
        "SCENE SAFETY: Secure area, ensure no ongoing hazards to responders",
        "TRIAGE: Implement START triage (Simple Triage and Rapid Treatment)",
        "RED CATEGORY: Immediate life-threatening injuries that can be saved",
        "YELLOW CATEGORY: Delayed treatment, stable but need monitoring",
        "GREEN CATEGORY: Walking wounded, minor injuries",
        "BLACK CATEGORY: Deceased or injuries incompatible with life",
        "TRANSPORT: Prioritize RED patients to appropriate trauma centers",
        "COMMUNICATION: Notify hospitals, request additional medical resources",
        "COMMAND: Establish unified command structure with medical branch",
    ],
};

static CHEMICAL: Protocol = Protocol {
    title: "HAZMAT EMERGENCY RESPONSE PROTOCOL",
    steps: &[
        "EVACUATION PERIMETER: Establish zones based on wind direction and chemical type",
        "DECONTAMINATION: Set up decontamination stations for exposed persons",
        "PPE: Ensure all responders use appropriate Level A/B protective equipment",
        "AIR MONITORING: Continuously monitor air quality with detection equipment",
        "MEDICAL: Treat exposed individuals, establish chemical-specific treatment protocols",
        "CONTAINMENT: Prevent further spread of contamination using appropriate methods",
        "IDENTIFICATION: Identify chemical using placards, shipping papers, or testing",
        "COMMUNICATION: Notify specialized hazmat teams and regional poison control",
    ],
};

static HURRICANE: Protocol = Protocol {
    title: "HURRICANE EMERGENCY RESPONSE PROTOCOL",
    steps: &[
        "EVACUATION ZONES: Implement mandatory evacuation for high-risk coastal areas",
        "TRANSPORTATION: Coordinate mass transit, contraflow lanes, fuel supplies",
        "SHELTER: Open and stock emergency shelters, pet-friendly facilities",
        "VULNERABLE POPULATIONS: Special assistance for elderly, disabled, medical needs",
        "UTILITIES: Pre-position repair crews, fuel, equipment outside impact zone",
        "COMMUNICATION: Maintain emergency communications, backup power systems",
        "SUPPLIES: Ensure adequate food, water, medical supplies for shelters",
        "COORDINATION: Establish emergency operations center with state/federal liaison",
    ],
};

static GENERAL: Protocol = Protocol {
    title: "GENERAL EMERGENCY RESPONSE PROTOCOL",
    steps: &[
        "ASSESS SITUATION: Determine scope, severity, and immediate threats to life safety",
        "ENSURE SAFETY: Protect first responders and public from additional harm",
        "ACTIVATE RESOURCES: Contact appropriate emergency services and resources",
        "ESTABLISH COMMAND: Set up incident command structure per ICS protocols",
        "COMMUNICATE: Notify authorities and public using all available channels",
        "COORDINATE: Manage resources and personnel to maximize effectiveness",
        "DOCUMENT: Record all actions taken for legal and after-action review",
        "MONITOR: Continuously assess changing conditions and adapt response",
    ],
};

/// Look up the protocol for a category
pub fn protocol(category: EmergencyCategory) -> &'static Protocol {
    match category {
        EmergencyCategory::Wildfire => &WILDFIRE,
        EmergencyCategory::Flood => &FLOOD,
        EmergencyCategory::Earthquake => &EARTHQUAKE,
        EmergencyCategory::MassCasualty => &MASS_CASUALTY,
        EmergencyCategory::Chemical => &CHEMICAL,
        EmergencyCategory::Hurricane => &HURRICANE,
        EmergencyCategory::General => &GENERAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_a_protocol() {
        for category in [
            EmergencyCategory::Wildfire,
            EmergencyCategory::Flood,
            EmergencyCategory::Earthquake,
            EmergencyCategory::MassCasualty,
            EmergencyCategory::Chemical,
            EmergencyCategory::Hurricane,
            EmergencyCategory::General,
        ] {
            let p = protocol(category);
            assert!(!p.title.is_empty());
            assert!(p.steps.len() >= 8, "{} has too few steps", p.title);
        }
    }

    #[test]
    fn test_mass_casualty_includes_start_triage() {
        let p = protocol(EmergencyCategory::MassCasualty);
        assert_eq!(p.steps.len(), 9);
        assert!(p.steps.iter().any(|s| s.contains("START triage")));
    }

    #[test]
    fn test_titles() {
        assert_eq!(
            protocol(EmergencyCategory::Wildfire).title,
            "WILDFIRE EVACUATION PROTOCOL"
        );
        assert_eq!(
            protocol(EmergencyCategory::Chemical).title,
            "HAZMAT EMERGENCY RESPONSE PROTOCOL"
        );
    }
}
