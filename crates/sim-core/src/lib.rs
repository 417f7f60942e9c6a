#![deny(warnings)]

//! Core domain models and invariants for Farm Navigator.
//!
//! This crate defines the serializable environmental snapshot shared by every
//! other crate, the rules that derive the season's challenge and mid-season
//! event from it, and the static table of decision effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod challenge;
pub mod decisions;
pub mod events;

pub use challenge::{classify, ChallengeType};
pub use decisions::{effect_for_key, DecisionEffect, DecisionId};
pub use events::{sample, Choice, MidSeasonEventType};

/// Simulated satellite-derived metrics for one region and season.
///
/// Snapshots are replaced rather than edited: applying a decision yields a
/// new value through [`EnvironmentalSnapshot::with_effect`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSnapshot {
    /// Vegetation index (NDVI-like) in [0,1].
    pub vegetation_index: f64,
    /// Volumetric soil moisture in [0,1].
    pub soil_moisture: f64,
    /// Precipitation in mm (>= 0).
    pub precipitation: f64,
    /// Land surface temperature anomaly in °C.
    pub temperature_anomaly: f64,
    /// Market demand multiplier (> 0).
    pub market_demand: f64,
    /// Probability in [0,1] that the mid-season event fires.
    pub random_event_chance: f64,
    /// Event that fires when the draw succeeds.
    pub random_event_type: MidSeasonEventType,
}

impl EnvironmentalSnapshot {
    /// Returns a copy shifted by the decision's deltas and reclamped:
    /// vegetation and moisture to [0,1], temperature anomaly floored at 0.
    pub fn with_effect(&self, effect: &DecisionEffect) -> Self {
        Self {
            vegetation_index: (self.vegetation_index + effect.vegetation_delta).clamp(0.0, 1.0),
            soil_moisture: (self.soil_moisture + effect.moisture_delta).clamp(0.0, 1.0),
            temperature_anomaly: (self.temperature_anomaly + effect.temperature_delta).max(0.0),
            ..self.clone()
        }
    }
}

/// Scale of the farm chosen at setup; decides the season's budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FarmType {
    #[default]
    #[serde(rename = "Small-Scale")]
    SmallScale,
    #[serde(rename = "Industrial")]
    Industrial,
}

impl FarmType {
    pub fn as_str(self) -> &'static str {
        match self {
            FarmType::SmallScale => "Small-Scale",
            FarmType::Industrial => "Industrial",
        }
    }
}

impl fmt::Display for FarmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FarmType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Industrial" => Ok(FarmType::Industrial),
            "Small-Scale" => Ok(FarmType::SmallScale),
            other => Err(ValidationError::UnknownFarmType(other.to_string())),
        }
    }
}

/// Simulation configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Simulated latency of the environmental data lookup.
    pub fetch_latency_ms: u64,
    /// Time spent in the planting phase before growing starts.
    pub planting_ms: u64,
    /// Time spent growing before the mid-season check.
    pub growing_ms: u64,
    /// Time spent analysing data once it is available.
    pub consulting_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            fetch_latency_ms: 2_000,
            planting_ms: 2_500,
            growing_ms: 3_000,
            consulting_ms: 2_000,
        }
    }
}

impl SimConfig {
    /// Configuration with every delay set to zero, for headless runs.
    pub fn instant(rng_seed: u64) -> Self {
        Self {
            rng_seed,
            fetch_latency_ms: 0,
            planting_ms: 0,
            growing_ms: 0,
            consulting_ms: 0,
        }
    }

    pub fn fetch_latency(&self) -> Duration {
        Duration::from_millis(self.fetch_latency_ms)
    }

    pub fn planting_delay(&self) -> Duration {
        Duration::from_millis(self.planting_ms)
    }

    pub fn growing_delay(&self) -> Duration {
        Duration::from_millis(self.growing_ms)
    }

    pub fn consulting_delay(&self) -> Duration {
        Duration::from_millis(self.consulting_ms)
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
    /// Ratio field must be within [0, 1].
    #[error("{0} must be within [0,1]")]
    OutOfUnitRange(&'static str),
    /// Precipitation cannot be negative.
    #[error("precipitation must be >= 0")]
    NegativePrecipitation,
    /// Demand multiplier must be strictly positive.
    #[error("market demand must be > 0")]
    NonPositiveDemand,
    /// Farm type label not recognised.
    #[error("unknown farm type: {0}")]
    UnknownFarmType(String),
    /// Decision key not in the effects table.
    #[error("unknown decision: {0}")]
    UnknownDecision(String),
}

fn check_unit(name: &'static str, v: f64) -> Result<(), ValidationError> {
    if !v.is_finite() {
        return Err(ValidationError::NonFinite(name));
    }
    if !(0.0..=1.0).contains(&v) {
        return Err(ValidationError::OutOfUnitRange(name));
    }
    Ok(())
}

/// Validate an environmental snapshot.
///
/// Raw provider data may carry a negative temperature anomaly; only the
/// decision path floors it.
pub fn validate_snapshot(s: &EnvironmentalSnapshot) -> Result<(), ValidationError> {
    check_unit("vegetation_index", s.vegetation_index)?;
    check_unit("soil_moisture", s.soil_moisture)?;
    check_unit("random_event_chance", s.random_event_chance)?;
    if !s.precipitation.is_finite() {
        return Err(ValidationError::NonFinite("precipitation"));
    }
    if s.precipitation < 0.0 {
        return Err(ValidationError::NegativePrecipitation);
    }
    if !s.temperature_anomaly.is_finite() {
        return Err(ValidationError::NonFinite("temperature_anomaly"));
    }
    if !s.market_demand.is_finite() {
        return Err(ValidationError::NonFinite("market_demand"));
    }
    if s.market_demand <= 0.0 {
        return Err(ValidationError::NonPositiveDemand);
    }
    Ok(())
}
