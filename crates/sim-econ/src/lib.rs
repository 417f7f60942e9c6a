#![deny(warnings)]

//! Season economy for Farm Navigator.
//!
//! This crate owns the player's ledger:
//! - Season budgets per farm scale and the fixed planting charge
//! - Affordability-checked decisions that also reshape the snapshot
//! - Harvest settlement from crop health, demand and market volatility

use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{effect_for_key, DecisionEffect, DecisionId, EnvironmentalSnapshot, FarmType};
use thiserror::Error;
use tracing::{debug, info};

/// Fixed cost of planting a season's crop.
pub const PLANTING_COST: u32 = 200;

/// Bounds of the uniform market volatility draw at harvest.
pub const VOLATILITY_RANGE: std::ops::Range<f64> = 0.8..1.2;

/// Errors produced by harvest settlement.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Volatility must be finite and non-negative.
    #[error("invalid market volatility: {0}")]
    InvalidVolatility(f64),
    /// Revenue computation left the representable range.
    #[error("non-finite numeric conversion")]
    NonFinite,
}

/// Budget for a season at the given farm scale.
///
/// Example:
/// assert_eq!(initial_budget(FarmType::Industrial), Decimal::new(2500, 0));
pub fn initial_budget(farm_type: FarmType) -> Decimal {
    match farm_type {
        FarmType::Industrial => Decimal::new(2500, 0),
        FarmType::SmallScale => Decimal::new(1000, 0),
    }
}

/// Crop health driving revenue: vegetation times moisture, penalised by the
/// temperature anomaly, floored at zero.
pub fn health_factor(s: &EnvironmentalSnapshot) -> f64 {
    (s.vegetation_index * s.soil_moisture - s.temperature_anomaly * 0.1).max(0.0)
}

/// Observable ledger values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyState {
    /// Budget the season started with.
    pub initial_budget: Decimal,
    /// Spendable balance.
    pub working_capital: Decimal,
    /// Cumulative spend this season.
    pub expenses: Decimal,
    /// Zero until harvest.
    pub revenue: Decimal,
    /// Revenue minus expenses; may be negative.
    pub profit: Decimal,
}

impl EconomyState {
    fn fresh(initial_budget: Decimal) -> Self {
        Self {
            initial_budget,
            working_capital: initial_budget,
            expenses: Decimal::ZERO,
            revenue: Decimal::ZERO,
            profit: Decimal::ZERO,
        }
    }
}

/// Final figures of a settled season.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarvestReport {
    pub health_factor: f64,
    pub market_volatility: f64,
    pub revenue: Decimal,
    pub expenses: Decimal,
    pub profit: Decimal,
    pub final_capital: Decimal,
}

impl HarvestReport {
    pub fn is_loss(&self) -> bool {
        self.profit < Decimal::ZERO
    }

    pub fn outcome_label(&self) -> &'static str {
        if self.is_loss() {
            "Season Loss"
        } else {
            "Season Profit"
        }
    }
}

/// Ledger owner. Every change to capital, expenses, revenue or profit goes
/// through this type.
#[derive(Clone, Debug)]
pub struct Economy {
    state: EconomyState,
}

impl Default for Economy {
    fn default() -> Self {
        Self::new(FarmType::default())
    }
}

impl Economy {
    pub fn new(farm_type: FarmType) -> Self {
        Self {
            state: EconomyState::fresh(initial_budget(farm_type)),
        }
    }

    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    /// Set the budget for the chosen farm scale and clear the ledger.
    pub fn start_season(&mut self, farm_type: FarmType) {
        self.state = EconomyState::fresh(initial_budget(farm_type));
        info!(%farm_type, budget = %self.state.initial_budget, "season started");
    }

    /// Charge planting as the season's first expense. Charging is relative
    /// to the budget, so planting again after a failed fetch costs once.
    pub fn plant(&mut self) {
        let cost = Decimal::from(PLANTING_COST);
        self.state.working_capital = self.state.initial_budget - cost;
        self.state.expenses = cost;
        debug!(capital = %self.state.working_capital, "planting charged");
    }

    /// Undo the planting charge after the season's data never arrived.
    pub fn abandon_planting(&mut self) {
        self.reset();
    }

    /// Restore the season's budget and clear expenses, revenue and profit.
    pub fn reset(&mut self) {
        self.state = EconomyState::fresh(self.state.initial_budget);
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.state.working_capital >= Decimal::from(cost)
    }

    /// Apply a decision: debit its cost and replace the snapshot with the
    /// shifted copy. Returns false with nothing changed when the cost exceeds
    /// working capital.
    pub fn apply_decision(&mut self, id: DecisionId, snapshot: &mut EnvironmentalSnapshot) -> bool {
        let applied = self.apply_effect(&id.effect(), snapshot);
        if applied {
            info!(decision = %id, capital = %self.state.working_capital, "decision applied");
        }
        applied
    }

    /// String-keyed variant of [`Economy::apply_decision`]; unknown keys act
    /// as a free no-op.
    pub fn apply_decision_key(&mut self, key: &str, snapshot: &mut EnvironmentalSnapshot) -> bool {
        self.apply_effect(&effect_for_key(key), snapshot)
    }

    fn apply_effect(&mut self, effect: &DecisionEffect, snapshot: &mut EnvironmentalSnapshot) -> bool {
        if !self.can_afford(effect.cost) {
            debug!(
                cost = effect.cost,
                capital = %self.state.working_capital,
                "decision rejected: insufficient funds"
            );
            return false;
        }
        let cost = Decimal::from(effect.cost);
        self.state.working_capital -= cost;
        self.state.expenses += cost;
        *snapshot = snapshot.with_effect(effect);
        true
    }

    /// Settle the season with a fresh volatility draw from `rng`.
    pub fn settle_harvest<R: Rng + ?Sized>(
        &mut self,
        snapshot: &EnvironmentalSnapshot,
        rng: &mut R,
    ) -> Result<HarvestReport, EconError> {
        let volatility = rng.gen_range(VOLATILITY_RANGE);
        self.settle_harvest_with_volatility(snapshot, volatility)
    }

    /// Settle the season with an explicit volatility multiplier.
    ///
    /// revenue = floor(budget × 2 × health × demand × volatility);
    /// profit = revenue − expenses; capital = budget + profit.
    pub fn settle_harvest_with_volatility(
        &mut self,
        snapshot: &EnvironmentalSnapshot,
        volatility: f64,
    ) -> Result<HarvestReport, EconError> {
        if !volatility.is_finite() || volatility < 0.0 {
            return Err(EconError::InvalidVolatility(volatility));
        }
        let health = health_factor(snapshot);
        let base = (self.state.initial_budget * Decimal::new(2, 0))
            .to_f64()
            .ok_or(EconError::NonFinite)?;
        let raw = (base * health * snapshot.market_demand * volatility).floor();
        if !raw.is_finite() {
            return Err(EconError::NonFinite);
        }
        let revenue = Decimal::from_f64(raw).ok_or(EconError::NonFinite)?;

        self.state.revenue = revenue;
        self.state.profit = revenue - self.state.expenses;
        self.state.working_capital = self.state.initial_budget + self.state.profit;
        info!(
            %revenue,
            profit = %self.state.profit,
            health,
            volatility,
            "harvest settled"
        );
        Ok(HarvestReport {
            health_factor: health,
            market_volatility: volatility,
            revenue,
            expenses: self.state.expenses,
            profit: self.state.profit,
            final_capital: self.state.working_capital,
        })
    }
}
