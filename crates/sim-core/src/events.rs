//! Mid-season random events.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DecisionId, EnvironmentalSnapshot};

/// Optional secondary event raised before the main challenge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidSeasonEventType {
    #[default]
    None,
    Heatwave,
    Pollinators,
    Pests,
}

/// A player answer to a mid-season event or main challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// Apply a decision from the effects table.
    Decide(DecisionId),
    /// Continue without spending anything.
    Pass,
}

impl MidSeasonEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            MidSeasonEventType::None => "none",
            MidSeasonEventType::Heatwave => "heatwave",
            MidSeasonEventType::Pollinators => "pollinators",
            MidSeasonEventType::Pests => "pests",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MidSeasonEventType::Pests => "Pest Activity Detected!",
            MidSeasonEventType::Heatwave => "Heat Wave Approaching!",
            MidSeasonEventType::Pollinators => "Beneficial Pollinators Spotted!",
            MidSeasonEventType::None => "Quiet Season",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MidSeasonEventType::Pests => {
                "High temperatures are causing a surge in pest activity. They could damage your crops."
            }
            MidSeasonEventType::Heatwave => {
                "A severe temperature anomaly will stress the crops and rapidly decrease soil moisture."
            }
            MidSeasonEventType::Pollinators => {
                "Conditions are perfect for pollinators, which will boost the final yield if protected."
            }
            MidSeasonEventType::None => {
                "The growing season is proceeding without any unusual events so far."
            }
        }
    }

    /// Choices offered for this event, most expensive first.
    pub fn options(self) -> &'static [Choice] {
        match self {
            MidSeasonEventType::Pests => &[
                Choice::Decide(DecisionId::PestsSpray),
                Choice::Decide(DecisionId::PestsOrganic),
                Choice::Decide(DecisionId::PestsIgnore),
            ],
            MidSeasonEventType::Heatwave => &[
                Choice::Decide(DecisionId::HeatwaveMist),
                Choice::Decide(DecisionId::HeatwaveIgnore),
            ],
            MidSeasonEventType::Pollinators => {
                &[Choice::Decide(DecisionId::PollinatorsProtect), Choice::Pass]
            }
            MidSeasonEventType::None => &[Choice::Pass],
        }
    }
}

impl fmt::Display for MidSeasonEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether the snapshot's mid-season event fires: one uniform draw in
/// [0,1) compared against `random_event_chance`.
pub fn sample<R: Rng + ?Sized>(s: &EnvironmentalSnapshot, rng: &mut R) -> MidSeasonEventType {
    let draw: f64 = rng.gen();
    if draw < s.random_event_chance {
        s.random_event_type
    } else {
        MidSeasonEventType::None
    }
}
