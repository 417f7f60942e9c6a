//! Static table of player decisions and their effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::ValidationError;

/// Cost and environmental deltas of one decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionEffect {
    /// Whole currency units debited from working capital.
    pub cost: u32,
    pub vegetation_delta: f64,
    pub moisture_delta: f64,
    pub temperature_delta: f64,
}

impl DecisionEffect {
    /// Effect of an unrecognised decision key.
    pub const NONE: DecisionEffect = DecisionEffect::new(0, 0.0, 0.0, 0.0);

    pub const fn new(cost: u32, vegetation: f64, moisture: f64, temperature: f64) -> Self {
        Self {
            cost,
            vegetation_delta: vegetation,
            moisture_delta: moisture,
            temperature_delta: temperature,
        }
    }
}

/// Every decision a player can take during a season.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionId {
    PestsSpray,
    PestsOrganic,
    PestsIgnore,
    HeatwaveMist,
    HeatwaveIgnore,
    PollinatorsProtect,
    IrrigationInvest,
    IrrigationLow,
    IrrigationIgnore,
    FertilizerChemical,
    FertilizerOrganic,
    PestIgnore,
    DrainageSystem,
    FloodIgnore,
    FirePrevention,
    FireIgnore,
}

impl DecisionId {
    pub const ALL: [DecisionId; 16] = [
        DecisionId::PestsSpray,
        DecisionId::PestsOrganic,
        DecisionId::PestsIgnore,
        DecisionId::HeatwaveMist,
        DecisionId::HeatwaveIgnore,
        DecisionId::PollinatorsProtect,
        DecisionId::IrrigationInvest,
        DecisionId::IrrigationLow,
        DecisionId::IrrigationIgnore,
        DecisionId::FertilizerChemical,
        DecisionId::FertilizerOrganic,
        DecisionId::PestIgnore,
        DecisionId::DrainageSystem,
        DecisionId::FloodIgnore,
        DecisionId::FirePrevention,
        DecisionId::FireIgnore,
    ];

    pub const fn effect(self) -> DecisionEffect {
        use DecisionId::*;
        match self {
            PestsSpray => DecisionEffect::new(300, 0.25, 0.0, 0.0),
            PestsOrganic => DecisionEffect::new(150, 0.15, 0.0, 0.0),
            PestsIgnore => DecisionEffect::new(0, -0.5, 0.0, 0.0),
            HeatwaveMist => DecisionEffect::new(400, 0.1, 0.15, -1.0),
            HeatwaveIgnore => DecisionEffect::new(0, -0.25, -0.1, 0.0),
            PollinatorsProtect => DecisionEffect::new(100, 0.2, 0.0, 0.0),
            IrrigationInvest => DecisionEffect::new(400, 0.05, 0.30, -0.5),
            IrrigationLow => DecisionEffect::new(150, 0.0, 0.15, -0.2),
            IrrigationIgnore => DecisionEffect::new(0, -0.1, -0.25, 0.0),
            FertilizerChemical => DecisionEffect::new(350, 0.35, 0.0, 0.0),
            FertilizerOrganic => DecisionEffect::new(200, 0.20, 0.0, 0.0),
            PestIgnore => DecisionEffect::new(0, -0.5, 0.0, 0.0),
            DrainageSystem => DecisionEffect::new(500, 0.1, -0.40, 0.0),
            // Total loss.
            FloodIgnore => DecisionEffect::new(0, -1.0, 0.0, 0.0),
            FirePrevention => DecisionEffect::new(600, 0.0, 0.0, 0.0),
            FireIgnore => DecisionEffect::new(0, -1.0, -1.0, 0.0),
        }
    }

    pub const fn key(self) -> &'static str {
        use DecisionId::*;
        match self {
            PestsSpray => "pests_spray",
            PestsOrganic => "pests_organic",
            PestsIgnore => "pests_ignore",
            HeatwaveMist => "heatwave_mist",
            HeatwaveIgnore => "heatwave_ignore",
            PollinatorsProtect => "pollinators_protect",
            IrrigationInvest => "irrigation_invest",
            IrrigationLow => "irrigation_low",
            IrrigationIgnore => "irrigation_ignore",
            FertilizerChemical => "fertilizer_chemical",
            FertilizerOrganic => "fertilizer_organic",
            PestIgnore => "pest_ignore",
            DrainageSystem => "drainage_system",
            FloodIgnore => "flood_ignore",
            FirePrevention => "fire_prevention",
            FireIgnore => "fire_ignore",
        }
    }

    /// Player-facing label.
    pub const fn label(self) -> &'static str {
        use DecisionId::*;
        match self {
            PestsSpray => "Preventative Spray",
            PestsOrganic => "Organic Ladybugs",
            PestsIgnore => "Ignore Threat",
            HeatwaveMist => "Deploy Cooling Mist",
            HeatwaveIgnore => "Hope It's Short",
            PollinatorsProtect => "Protect Habitat",
            IrrigationInvest => "Invest in Advanced Irrigation",
            IrrigationLow => "Low-Cost Water Rations",
            IrrigationIgnore => "Ignore, Hope for Rain",
            FertilizerChemical => "Chemical Treatment",
            FertilizerOrganic => "Organic Pest Control",
            PestIgnore => "Do Nothing, Risk Yield",
            DrainageSystem => "Activate Emergency Drainage",
            FloodIgnore => "Wait and See",
            FirePrevention => "Create Firebreak",
            FireIgnore => "Take the Risk",
        }
    }

    pub const fn cost(self) -> u32 {
        self.effect().cost
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DecisionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionId::ALL
            .into_iter()
            .find(|d| d.key() == s)
            .ok_or_else(|| ValidationError::UnknownDecision(s.to_string()))
    }
}

/// Looks up a decision by its string key.
///
/// Unknown keys map to [`DecisionEffect::NONE`] so that a stray id behaves as
/// a free no-op; the miss is logged.
pub fn effect_for_key(key: &str) -> DecisionEffect {
    match key.parse::<DecisionId>() {
        Ok(id) => id.effect(),
        Err(_) => {
            warn!(decision = key, "unknown decision id, applying zero effect");
            DecisionEffect::NONE
        }
    }
}
