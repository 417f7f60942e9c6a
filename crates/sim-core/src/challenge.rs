//! Main-season challenge classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DecisionId, EnvironmentalSnapshot};

/// Hazard the player must answer in the main challenge phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    #[default]
    None,
    Drought,
    Pests,
    Flooding,
    WildfireRisk,
}

impl ChallengeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeType::None => "none",
            ChallengeType::Drought => "drought",
            ChallengeType::Pests => "pests",
            ChallengeType::Flooding => "flooding",
            ChallengeType::WildfireRisk => "wildfire_risk",
        }
    }

    /// Alert text shown when the challenge is raised.
    pub fn briefing(self) -> &'static str {
        match self {
            ChallengeType::Drought => {
                "CRITICAL DROUGHT ALERT: soil moisture is dangerously low and rainfall is absent. \
                 Crop failure is imminent without intervention."
            }
            ChallengeType::Pests => {
                "PEST INFESTATION WARNING: a high heat anomaly has created ideal breeding \
                 conditions for pests. Vegetation index values are starting to drop."
            }
            ChallengeType::Flooding => {
                "FLOOD EMERGENCY: extreme rainfall has oversaturated the ground. Immediate \
                 action is required to prevent total crop loss."
            }
            ChallengeType::WildfireRisk => {
                "IMMINENT FIRE THREAT: critically low moisture, extreme heat and low \
                 precipitation have put the farm at extreme risk."
            }
            ChallengeType::None => "Conditions appear stable. Monitor data for any changes.",
        }
    }

    /// Decisions offered for this challenge, most expensive first.
    pub fn options(self) -> &'static [DecisionId] {
        match self {
            ChallengeType::Drought => &[
                DecisionId::IrrigationInvest,
                DecisionId::IrrigationLow,
                DecisionId::IrrigationIgnore,
            ],
            ChallengeType::Pests => &[
                DecisionId::FertilizerChemical,
                DecisionId::FertilizerOrganic,
                DecisionId::PestIgnore,
            ],
            ChallengeType::Flooding => &[DecisionId::DrainageSystem, DecisionId::FloodIgnore],
            ChallengeType::WildfireRisk => &[DecisionId::FirePrevention, DecisionId::FireIgnore],
            ChallengeType::None => &[],
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a snapshot to at most one challenge. Guards are evaluated in order and
/// the first match wins; all comparisons are strict.
pub fn classify(s: &EnvironmentalSnapshot) -> ChallengeType {
    if s.soil_moisture < 0.20 && s.precipitation < 10.0 && s.temperature_anomaly > 2.0 {
        ChallengeType::WildfireRisk
    } else if s.soil_moisture < 0.40 && s.precipitation < 20.0 {
        ChallengeType::Drought
    } else if s.vegetation_index < 0.75 && s.temperature_anomaly > 1.5 {
        ChallengeType::Pests
    } else if s.soil_moisture > 0.9 && s.precipitation > 150.0 {
        ChallengeType::Flooding
    } else {
        ChallengeType::None
    }
}
