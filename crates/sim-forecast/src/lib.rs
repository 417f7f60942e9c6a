#![deny(warnings)]

//! Crop health prediction and the soil-moisture trend shown alongside it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sim_core::EnvironmentalSnapshot;
use tracing::debug;

/// Number of points in the trend chart; the last one is "today".
pub const TREND_DAYS: u32 = 7;

/// Outcome band of the health prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Excellent,
    Moderate,
    Critical,
}

impl HealthTier {
    pub fn message(self) -> &'static str {
        match self {
            HealthTier::Excellent => {
                "Excellent yield predicted! Your use of data led to a healthy crop."
            }
            HealthTier::Moderate => {
                "A respectable yield is likely. You successfully navigated some challenges."
            }
            HealthTier::Critical => {
                "Crop health is critical. A significant loss is almost certain due to environmental stress."
            }
        }
    }

    /// Display colour as 0xAARRGGBB.
    pub fn color_argb(self) -> u32 {
        match self {
            HealthTier::Excellent => 0xFF4CAF50,
            HealthTier::Moderate => 0xFFFFC107,
            HealthTier::Critical => 0xFFF44336,
        }
    }
}

/// Health prediction computed when the season enters outcome prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub score: f64,
    pub tier: HealthTier,
}

impl Prediction {
    pub fn message(&self) -> &'static str {
        self.tier.message()
    }
}

/// Weighted health score: half vegetation, half moisture, minus a small
/// temperature penalty.
pub fn health_score(s: &EnvironmentalSnapshot) -> f64 {
    s.vegetation_index * 0.5 + s.soil_moisture * 0.5 - s.temperature_anomaly * 0.05
}

pub fn tier_for(score: f64) -> HealthTier {
    if score >= 0.70 {
        HealthTier::Excellent
    } else if score >= 0.45 {
        HealthTier::Moderate
    } else {
        HealthTier::Critical
    }
}

pub fn predict(s: &EnvironmentalSnapshot) -> Prediction {
    let score = health_score(s);
    let tier = tier_for(score);
    debug!(score, ?tier, "crop health predicted");
    Prediction { score, tier }
}

/// One day of the soil-moisture trend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub day: u32,
    pub value: f64,
}

/// Synthetic week leading up to today's soil moisture. Earlier days sit
/// around 0.15 below today with ±0.1 jitter; the last day is exact.
///
/// Computed once when a season's data arrives. Later decisions move the
/// snapshot but not the chart, so the last point keeps the fetched moisture.
pub fn generate_trend<R: Rng + ?Sized>(s: &EnvironmentalSnapshot, rng: &mut R) -> Vec<ChartDataPoint> {
    (1..=TREND_DAYS)
        .map(|day| {
            let value = if day == TREND_DAYS {
                s.soil_moisture
            } else {
                let jitter: f64 = rng.gen_range(-0.1..0.1);
                (s.soil_moisture - 0.15 + jitter).clamp(0.0, 1.0)
            };
            ChartDataPoint { day, value }
        })
        .collect()
}
