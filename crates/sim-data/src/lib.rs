#![deny(warnings)]

//! Environmental data provider: a canned stand-in for a satellite data
//! service, with simulated network latency.

use sim_core::{validate_snapshot, EnvironmentalSnapshot, MidSeasonEventType, ValidationError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Regions offered to the player.
pub const REGIONS: [&str; 6] = [
    "Gujarat, India",
    "Punjab, India",
    "Maharashtra, India",
    "Rajasthan, India",
    "California, USA",
    "Iowa, USA",
];

/// Seasons offered to the player.
pub const SEASONS: [&str; 4] = ["Summer", "Monsoon", "Autumn", "Winter"];

/// Errors produced while fetching a snapshot.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// The lookup returned a record that breaks snapshot invariants.
    #[error("data simulation failed: {0}")]
    Invalid(String),
    /// The service could not produce data.
    #[error("data simulation failed: {0}")]
    Unavailable(String),
}

impl From<ValidationError> for FetchError {
    fn from(e: ValidationError) -> Self {
        FetchError::Invalid(e.to_string())
    }
}

/// Boxed fetch future; owns everything it needs so it can be polled
/// independently of the provider.
pub type FetchFuture =
    Pin<Box<dyn Future<Output = Result<EnvironmentalSnapshot, FetchError>> + Send + 'static>>;

/// Source of environmental snapshots for a (region, season) pair.
pub trait DataProvider: Send + Sync {
    fn fetch(&self, region: &str, season: &str) -> FetchFuture;
}

/// Hardcoded records keyed by exact region and season match, with a default
/// for every other pair.
#[derive(Clone, Debug)]
pub struct CannedProvider {
    latency: Duration,
}

impl Default for CannedProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl CannedProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl DataProvider for CannedProvider {
    fn fetch(&self, region: &str, season: &str) -> FetchFuture {
        let latency = self.latency;
        let snapshot = canned_snapshot(region, season);
        let (region, season) = (region.to_string(), season.to_string());
        Box::pin(async move {
            debug!(%region, %season, ?latency, "fetching environmental data");
            tokio::time::sleep(latency).await;
            validate_snapshot(&snapshot)?;
            info!(%region, %season, "environmental data ready");
            Ok::<_, FetchError>(snapshot)
        })
    }
}

fn record(
    vegetation_index: f64,
    soil_moisture: f64,
    precipitation: f64,
    temperature_anomaly: f64,
    market_demand: f64,
    random_event_chance: f64,
    random_event_type: MidSeasonEventType,
) -> EnvironmentalSnapshot {
    EnvironmentalSnapshot {
        vegetation_index,
        soil_moisture,
        precipitation,
        temperature_anomaly,
        market_demand,
        random_event_chance,
        random_event_type,
    }
}

/// Immediate lookup behind [`CannedProvider`].
pub fn canned_snapshot(region: &str, season: &str) -> EnvironmentalSnapshot {
    use MidSeasonEventType::*;
    match (region, season) {
        ("Gujarat, India", "Summer") => record(0.55, 0.40, 10.0, 2.5, 1.5, 0.7, Heatwave),
        ("Punjab, India", "Monsoon") => record(0.88, 0.95, 250.0, -1.0, 0.8, 0.4, Pollinators),
        ("Iowa, USA", "Summer") => record(0.70, 0.75, 85.0, 1.8, 1.2, 0.8, Pests),
        ("California, USA", "Summer") => record(0.65, 0.15, 2.0, 3.0, 1.4, 0.0, None),
        _ => default_snapshot(),
    }
}

/// Fallback record for unmatched pairs.
pub fn default_snapshot() -> EnvironmentalSnapshot {
    record(0.78, 0.65, 60.0, 0.5, 1.0, 0.2, MidSeasonEventType::Pollinators)
}

/// Provider that always fails after its latency, for exercising the error
/// path.
#[derive(Clone, Debug)]
pub struct FailingProvider {
    latency: Duration,
    reason: String,
}

impl FailingProvider {
    pub fn new(latency: Duration, reason: impl Into<String>) -> Self {
        Self {
            latency,
            reason: reason.into(),
        }
    }
}

impl DataProvider for FailingProvider {
    fn fetch(&self, _region: &str, _season: &str) -> FetchFuture {
        let latency = self.latency;
        let reason = self.reason.clone();
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            Err::<EnvironmentalSnapshot, _>(FetchError::Unavailable(reason))
        })
    }
}
