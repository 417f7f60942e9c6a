//! Season state machine. Player actions, phase timers and data arrival all
//! enter through [`Simulation::advance`].

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    classify, sample, ChallengeType, Choice, DecisionId, EnvironmentalSnapshot, FarmType,
    MidSeasonEventType, SimConfig,
};
use sim_data::{FetchError, REGIONS, SEASONS};
use sim_econ::{EconError, Economy, EconomyState, HarvestReport};
use sim_forecast::{generate_trend, predict, ChartDataPoint, Prediction};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const VIEW_CHANNEL_CAPACITY: usize = 64;

/// Phase of the season. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimPhase {
    FarmSetup,
    Idle,
    Planting,
    GrowingSeason,
    MidSeasonEvent,
    ConsultingData,
    MainChallenge,
    PredictingOutcome,
    Harvested,
}

impl SimPhase {
    /// Whether the phase waits for the player rather than a timer or data.
    pub fn awaits_player(self) -> bool {
        !matches!(
            self,
            SimPhase::Planting | SimPhase::GrowingSeason | SimPhase::ConsultingData
        )
    }

    /// Status line shown while the phase is active.
    pub fn status(self) -> &'static str {
        match self {
            SimPhase::FarmSetup => "Choose the scale of your farm.",
            SimPhase::Idle => "Pick a region and season, then plant.",
            SimPhase::Planting => {
                "Crops planted! Initial costs deducted. The growing season begins..."
            }
            SimPhase::GrowingSeason => {
                "Crops are growing. Monitoring satellite feeds for any changes..."
            }
            SimPhase::MidSeasonEvent => "Something is happening in the fields.",
            SimPhase::ConsultingData => {
                "Analyzing mid-season satellite data for the main forecast..."
            }
            SimPhase::MainChallenge => "!!! URGENT DATA ALERT !!!",
            SimPhase::PredictingOutcome => "Forecast ready. Proceed to harvest when ready.",
            SimPhase::Harvested => "Season complete.",
        }
    }
}

/// Delays that move the season forward on their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTimer {
    Planting,
    Growing,
    Consulting,
}

/// Input to the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    SelectFarmType(FarmType),
    SelectRegion(String),
    SelectSeason(String),
    Plant,
    /// Result of the fetch issued for season `epoch`.
    DataArrived {
        epoch: u64,
        result: Result<EnvironmentalSnapshot, FetchError>,
    },
    /// A timer scheduled for season `epoch` elapsed.
    TimerElapsed { epoch: u64, timer: PhaseTimer },
    Choose(Choice),
    /// String-keyed decision; unknown keys are accepted as a free no-op.
    ChooseKey(String),
    Harvest,
    Replay,
}

/// Side effect the owner of the machine must carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Fetch {
        epoch: u64,
        region: String,
        season: String,
    },
    StartTimer {
        epoch: u64,
        timer: PhaseTimer,
        after: Duration,
    },
}

/// Result of one accepted event.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub from: SimPhase,
    pub to: SimPhase,
    pub commands: Vec<Command>,
}

impl Step {
    pub fn changed_phase(&self) -> bool {
        self.from != self.to
    }
}

/// Rejected events. The machine state is untouched when one is returned.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("{action} is not available during {phase:?}")]
    InvalidAction {
        action: &'static str,
        phase: SimPhase,
    },
    #[error("{choice:?} is not offered during {phase:?}")]
    NotOffered { choice: Choice, phase: SimPhase },
    #[error("insufficient funds for {decision}: costs {cost}, capital {capital}")]
    InsufficientFunds {
        decision: DecisionId,
        cost: u32,
        capital: Decimal,
    },
    #[error("region and season must be selected before planting")]
    MissingSelection,
    #[error("no environmental data for the current season")]
    NoData,
    #[error(transparent)]
    Settlement(#[from] EconError),
}

/// Availability of the season's environmental data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DataState {
    Pending,
    Loading,
    Ready(EnvironmentalSnapshot),
    Failed(String),
}

impl DataState {
    pub fn snapshot(&self) -> Option<&EnvironmentalSnapshot> {
        match self {
            DataState::Ready(s) => Some(s),
            _ => None,
        }
    }
}

/// Read-only copy of everything presentation may observe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimView {
    pub phase: SimPhase,
    pub epoch: u64,
    pub farm_type: FarmType,
    pub region: String,
    pub season: String,
    pub economy: EconomyState,
    pub data: DataState,
    pub challenge: ChallengeType,
    pub mid_season_event: MidSeasonEventType,
    pub trend: Vec<ChartDataPoint>,
    pub prediction: Option<Prediction>,
    pub harvest: Option<HarvestReport>,
    pub last_error: Option<String>,
}

/// Single owner of the season: phase, ledger, snapshot and derived outputs.
pub struct Simulation {
    config: SimConfig,
    rng: ChaCha8Rng,
    phase: SimPhase,
    epoch: u64,
    farm_type: FarmType,
    region: String,
    season: String,
    economy: Economy,
    data: DataState,
    challenge: ChallengeType,
    event: MidSeasonEventType,
    trend: Vec<ChartDataPoint>,
    prediction: Option<Prediction>,
    harvest: Option<HarvestReport>,
    last_error: Option<String>,
    consult_pending: bool,
    updates: broadcast::Sender<SimView>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let (updates, _) = broadcast::channel(VIEW_CHANNEL_CAPACITY);
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            config,
            phase: SimPhase::FarmSetup,
            epoch: 0,
            farm_type: FarmType::default(),
            region: REGIONS[0].to_string(),
            season: SEASONS[0].to_string(),
            economy: Economy::default(),
            data: DataState::Pending,
            challenge: ChallengeType::None,
            event: MidSeasonEventType::None,
            trend: Vec::new(),
            prediction: None,
            harvest: None,
            last_error: None,
            consult_pending: false,
            updates,
        }
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    /// Identifier of the current season; bumped on planting, replay and
    /// fetch failure so that late timers and data are discarded.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn economy(&self) -> &EconomyState {
        self.economy.state()
    }

    pub fn snapshot(&self) -> Option<&EnvironmentalSnapshot> {
        self.data.snapshot()
    }

    pub fn challenge(&self) -> ChallengeType {
        self.challenge
    }

    pub fn mid_season_event(&self) -> MidSeasonEventType {
        self.event
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn harvest(&self) -> Option<&HarvestReport> {
        self.harvest.as_ref()
    }

    /// Choices the player can make right now, if the phase takes one.
    pub fn options(&self) -> Vec<Choice> {
        match self.phase {
            SimPhase::MidSeasonEvent => self.event.options().to_vec(),
            SimPhase::MainChallenge => self
                .challenge
                .options()
                .iter()
                .map(|d| Choice::Decide(*d))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn view(&self) -> SimView {
        SimView {
            phase: self.phase,
            epoch: self.epoch,
            farm_type: self.farm_type,
            region: self.region.clone(),
            season: self.season.clone(),
            economy: self.economy.state().clone(),
            data: self.data.clone(),
            challenge: self.challenge,
            mid_season_event: self.event,
            trend: self.trend.clone(),
            prediction: self.prediction.clone(),
            harvest: self.harvest.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Receive a [`SimView`] after every accepted event.
    pub fn subscribe(&self) -> broadcast::Receiver<SimView> {
        self.updates.subscribe()
    }

    pub fn advance(&mut self, event: SimEvent) -> Result<Step, SimError> {
        let from = self.phase;
        let commands = match event {
            SimEvent::SelectFarmType(farm_type) => self.select_farm_type(farm_type)?,
            SimEvent::SelectRegion(region) => {
                self.require_selection_phase("select region")?;
                self.region = region;
                Vec::new()
            }
            SimEvent::SelectSeason(season) => {
                self.require_selection_phase("select season")?;
                self.season = season;
                Vec::new()
            }
            SimEvent::Plant => self.plant()?,
            SimEvent::DataArrived { epoch, result } => self.data_arrived(epoch, result),
            SimEvent::TimerElapsed { epoch, timer } => self.timer_elapsed(epoch, timer),
            SimEvent::Choose(choice) => self.choose(choice)?,
            SimEvent::ChooseKey(key) => self.choose_key(&key)?,
            SimEvent::Harvest => self.settle()?,
            SimEvent::Replay => self.replay()?,
        };
        if from != self.phase {
            info!(?from, to = ?self.phase, epoch = self.epoch, "phase transition");
        }
        // No receivers is fine.
        let _ = self.updates.send(self.view());
        Ok(Step {
            from,
            to: self.phase,
            commands,
        })
    }

    fn require(&self, phase: SimPhase, action: &'static str) -> Result<(), SimError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SimError::InvalidAction {
                action,
                phase: self.phase,
            })
        }
    }

    fn require_selection_phase(&self, action: &'static str) -> Result<(), SimError> {
        match self.phase {
            SimPhase::FarmSetup | SimPhase::Idle => Ok(()),
            phase => Err(SimError::InvalidAction { action, phase }),
        }
    }

    fn timer(&self, timer: PhaseTimer, after: Duration) -> Command {
        Command::StartTimer {
            epoch: self.epoch,
            timer,
            after,
        }
    }

    fn select_farm_type(&mut self, farm_type: FarmType) -> Result<Vec<Command>, SimError> {
        self.require(SimPhase::FarmSetup, "select farm type")?;
        self.farm_type = farm_type;
        self.economy.start_season(farm_type);
        self.phase = SimPhase::Idle;
        Ok(Vec::new())
    }

    fn plant(&mut self) -> Result<Vec<Command>, SimError> {
        self.require(SimPhase::Idle, "plant")?;
        if self.region.trim().is_empty() || self.season.trim().is_empty() {
            return Err(SimError::MissingSelection);
        }
        self.economy.plant();
        self.epoch += 1;
        self.clear_season_outputs();
        self.last_error = None;
        self.data = DataState::Loading;
        self.phase = SimPhase::Planting;
        Ok(vec![
            Command::Fetch {
                epoch: self.epoch,
                region: self.region.clone(),
                season: self.season.clone(),
            },
            self.timer(PhaseTimer::Planting, self.config.planting_delay()),
        ])
    }

    fn data_arrived(
        &mut self,
        epoch: u64,
        result: Result<EnvironmentalSnapshot, FetchError>,
    ) -> Vec<Command> {
        if epoch != self.epoch || self.data != DataState::Loading {
            debug!(epoch, current = self.epoch, "discarding stale data");
            return Vec::new();
        }
        match result {
            Ok(snapshot) => {
                self.challenge = classify(&snapshot);
                // Drawn once per fetch; only raised if growing has not ended.
                self.event = sample(&snapshot, &mut self.rng);
                self.trend = generate_trend(&snapshot, &mut self.rng);
                info!(
                    challenge = %self.challenge,
                    event = %self.event,
                    "season data classified"
                );
                self.data = DataState::Ready(snapshot);
                if self.phase == SimPhase::ConsultingData {
                    self.schedule_consult()
                } else {
                    Vec::new()
                }
            }
            Err(e) => {
                warn!(error = %e, region = %self.region, season = %self.season, "fetch failed");
                self.economy.abandon_planting();
                self.epoch += 1;
                self.clear_season_outputs();
                self.data = DataState::Failed(e.to_string());
                self.last_error = Some(e.to_string());
                self.phase = SimPhase::Idle;
                Vec::new()
            }
        }
    }

    fn timer_elapsed(&mut self, epoch: u64, timer: PhaseTimer) -> Vec<Command> {
        if epoch != self.epoch {
            debug!(?timer, epoch, current = self.epoch, "discarding stale timer");
            return Vec::new();
        }
        match (self.phase, timer) {
            (SimPhase::Planting, PhaseTimer::Planting) => {
                self.phase = SimPhase::GrowingSeason;
                vec![self.timer(PhaseTimer::Growing, self.config.growing_delay())]
            }
            (SimPhase::GrowingSeason, PhaseTimer::Growing) => {
                if self.event != MidSeasonEventType::None {
                    self.phase = SimPhase::MidSeasonEvent;
                    Vec::new()
                } else {
                    self.enter_consulting()
                }
            }
            (SimPhase::ConsultingData, PhaseTimer::Consulting) => {
                self.consult_pending = false;
                if self.challenge != ChallengeType::None {
                    self.phase = SimPhase::MainChallenge;
                } else {
                    self.enter_prediction();
                }
                Vec::new()
            }
            (phase, timer) => {
                debug!(?phase, ?timer, "timer does not apply to phase");
                Vec::new()
            }
        }
    }

    fn enter_consulting(&mut self) -> Vec<Command> {
        self.phase = SimPhase::ConsultingData;
        if self.data.snapshot().is_some() {
            self.schedule_consult()
        } else {
            debug!("waiting for environmental data");
            Vec::new()
        }
    }

    fn schedule_consult(&mut self) -> Vec<Command> {
        if self.consult_pending {
            return Vec::new();
        }
        self.consult_pending = true;
        vec![self.timer(PhaseTimer::Consulting, self.config.consulting_delay())]
    }

    fn enter_prediction(&mut self) {
        self.prediction = self.data.snapshot().map(predict);
        self.phase = SimPhase::PredictingOutcome;
    }

    fn offered(&self, choice: Choice) -> bool {
        match self.phase {
            SimPhase::MidSeasonEvent => self.event.options().contains(&choice),
            SimPhase::MainChallenge => match choice {
                Choice::Decide(id) => self.challenge.options().contains(&id),
                Choice::Pass => false,
            },
            _ => false,
        }
    }

    fn require_decision_phase(&self, action: &'static str) -> Result<(), SimError> {
        match self.phase {
            SimPhase::MidSeasonEvent | SimPhase::MainChallenge => Ok(()),
            phase => Err(SimError::InvalidAction { action, phase }),
        }
    }

    fn choose(&mut self, choice: Choice) -> Result<Vec<Command>, SimError> {
        self.require_decision_phase("choose")?;
        if !self.offered(choice) {
            return Err(SimError::NotOffered {
                choice,
                phase: self.phase,
            });
        }
        if let Choice::Decide(id) = choice {
            let DataState::Ready(snapshot) = &mut self.data else {
                return Err(SimError::NoData);
            };
            if !self.economy.apply_decision(id, snapshot) {
                return Err(SimError::InsufficientFunds {
                    decision: id,
                    cost: id.cost(),
                    capital: self.economy.state().working_capital,
                });
            }
        }
        Ok(self.decision_resolved())
    }

    fn choose_key(&mut self, key: &str) -> Result<Vec<Command>, SimError> {
        if let Ok(id) = key.parse::<DecisionId>() {
            return self.choose(Choice::Decide(id));
        }
        self.require_decision_phase("choose")?;
        let DataState::Ready(snapshot) = &mut self.data else {
            return Err(SimError::NoData);
        };
        // Zero effect: always affordable, nothing changes but the phase.
        self.economy.apply_decision_key(key, snapshot);
        Ok(self.decision_resolved())
    }

    fn decision_resolved(&mut self) -> Vec<Command> {
        match self.phase {
            SimPhase::MidSeasonEvent => self.enter_consulting(),
            _ => {
                self.enter_prediction();
                Vec::new()
            }
        }
    }

    fn settle(&mut self) -> Result<Vec<Command>, SimError> {
        self.require(SimPhase::PredictingOutcome, "harvest")?;
        let snapshot = self.data.snapshot().ok_or(SimError::NoData)?;
        let report = self.economy.settle_harvest(snapshot, &mut self.rng)?;
        self.harvest = Some(report);
        self.phase = SimPhase::Harvested;
        Ok(Vec::new())
    }

    fn replay(&mut self) -> Result<Vec<Command>, SimError> {
        self.require(SimPhase::Harvested, "replay")?;
        self.economy.reset();
        self.epoch += 1;
        self.clear_season_outputs();
        self.data = DataState::Pending;
        self.last_error = None;
        self.phase = SimPhase::FarmSetup;
        Ok(Vec::new())
    }

    fn clear_season_outputs(&mut self) {
        self.challenge = ChallengeType::None;
        self.event = MidSeasonEventType::None;
        self.trend.clear();
        self.prediction = None;
        self.harvest = None;
        self.consult_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(
        veg: f64,
        moist: f64,
        precip: f64,
        temp: f64,
        chance: f64,
        kind: MidSeasonEventType,
    ) -> EnvironmentalSnapshot {
        EnvironmentalSnapshot {
            vegetation_index: veg,
            soil_moisture: moist,
            precipitation: precip,
            temperature_anomaly: temp,
            market_demand: 1.0,
            random_event_chance: chance,
            random_event_type: kind,
        }
    }

    fn quiet() -> EnvironmentalSnapshot {
        snapshot(0.78, 0.65, 60.0, 0.5, 0.0, MidSeasonEventType::None)
    }

    fn planted(farm: FarmType) -> Simulation {
        let mut sim = Simulation::new(SimConfig::default());
        sim.advance(SimEvent::SelectFarmType(farm)).unwrap();
        sim.advance(SimEvent::Plant).unwrap();
        sim
    }

    fn tick(sim: &mut Simulation, timer: PhaseTimer) -> Step {
        let epoch = sim.epoch();
        sim.advance(SimEvent::TimerElapsed { epoch, timer }).unwrap()
    }

    fn arrive(sim: &mut Simulation, s: EnvironmentalSnapshot) -> Step {
        let epoch = sim.epoch();
        sim.advance(SimEvent::DataArrived {
            epoch,
            result: Ok(s),
        })
        .unwrap()
    }

    #[test]
    fn setup_selects_budget() {
        let mut sim = Simulation::new(SimConfig::default());
        assert_eq!(sim.phase(), SimPhase::FarmSetup);
        sim.advance(SimEvent::SelectFarmType(FarmType::Industrial))
            .unwrap();
        assert_eq!(sim.phase(), SimPhase::Idle);
        assert_eq!(sim.economy().working_capital, Decimal::new(2500, 0));
    }

    #[test]
    fn plant_issues_fetch_and_timer() {
        let mut sim = Simulation::new(SimConfig::default());
        sim.advance(SimEvent::SelectFarmType(FarmType::SmallScale))
            .unwrap();
        sim.advance(SimEvent::SelectRegion("Iowa, USA".into()))
            .unwrap();
        sim.advance(SimEvent::SelectSeason("Summer".into())).unwrap();
        let step = sim.advance(SimEvent::Plant).unwrap();
        assert_eq!(step.to, SimPhase::Planting);
        assert_eq!(
            step.commands,
            vec![
                Command::Fetch {
                    epoch: 1,
                    region: "Iowa, USA".into(),
                    season: "Summer".into(),
                },
                Command::StartTimer {
                    epoch: 1,
                    timer: PhaseTimer::Planting,
                    after: Duration::from_millis(2_500),
                },
            ]
        );
        assert_eq!(sim.economy().working_capital, Decimal::new(800, 0));
        assert_eq!(sim.economy().expenses, Decimal::new(200, 0));
        assert_eq!(sim.view().data, DataState::Loading);
    }

    #[test]
    fn quiet_season_skips_event_and_challenge() {
        let mut sim = planted(FarmType::SmallScale);
        arrive(&mut sim, quiet());
        assert_eq!(sim.view().trend.len(), 7);
        let step = tick(&mut sim, PhaseTimer::Planting);
        assert_eq!(step.to, SimPhase::GrowingSeason);
        let step = tick(&mut sim, PhaseTimer::Growing);
        assert_eq!(step.to, SimPhase::ConsultingData);
        assert!(matches!(
            step.commands.as_slice(),
            [Command::StartTimer { timer: PhaseTimer::Consulting, .. }]
        ));
        let step = tick(&mut sim, PhaseTimer::Consulting);
        assert_eq!(step.to, SimPhase::PredictingOutcome);
        let p = sim.prediction().unwrap();
        assert!((p.score - 0.69).abs() < 1e-9);
    }

    #[test]
    fn certain_event_routes_through_mid_season() {
        let mut sim = planted(FarmType::SmallScale);
        arrive(
            &mut sim,
            snapshot(0.5, 0.5, 50.0, 0.0, 1.0, MidSeasonEventType::Heatwave),
        );
        assert_eq!(sim.mid_season_event(), MidSeasonEventType::Heatwave);
        tick(&mut sim, PhaseTimer::Planting);
        let step = tick(&mut sim, PhaseTimer::Growing);
        assert_eq!(step.to, SimPhase::MidSeasonEvent);
        assert_eq!(
            sim.options(),
            vec![
                Choice::Decide(DecisionId::HeatwaveMist),
                Choice::Decide(DecisionId::HeatwaveIgnore)
            ]
        );
        // Pass is not offered for a heat wave.
        assert_eq!(
            sim.advance(SimEvent::Choose(Choice::Pass)),
            Err(SimError::NotOffered {
                choice: Choice::Pass,
                phase: SimPhase::MidSeasonEvent
            })
        );
        let step = sim
            .advance(SimEvent::Choose(Choice::Decide(DecisionId::HeatwaveMist)))
            .unwrap();
        assert_eq!(step.to, SimPhase::ConsultingData);
        assert_eq!(step.commands.len(), 1);
        assert_eq!(sim.economy().working_capital, Decimal::new(400, 0));
        let s = sim.snapshot().unwrap();
        assert!((s.soil_moisture - 0.65).abs() < 1e-9);
        assert_eq!(s.temperature_anomaly, 0.0);
        // The trend was drawn at data arrival and still ends on that moisture.
        assert_eq!(sim.view().trend.last().map(|p| p.value), Some(0.5));
    }

    #[test]
    fn every_phase_has_status_text() {
        let phases = [
            SimPhase::FarmSetup,
            SimPhase::Idle,
            SimPhase::Planting,
            SimPhase::GrowingSeason,
            SimPhase::MidSeasonEvent,
            SimPhase::ConsultingData,
            SimPhase::MainChallenge,
            SimPhase::PredictingOutcome,
            SimPhase::Harvested,
        ];
        for phase in phases {
            assert!(!phase.status().is_empty(), "{phase:?}");
        }
        assert_eq!(SimPhase::MainChallenge.status(), "!!! URGENT DATA ALERT !!!");
        assert!(SimPhase::Planting.status().starts_with("Crops planted!"));
        assert!(SimPhase::ConsultingData
            .status()
            .starts_with("Analyzing mid-season satellite data"));
    }

    #[test]
    fn consulting_waits_for_late_data() {
        let mut sim = planted(FarmType::SmallScale);
        tick(&mut sim, PhaseTimer::Planting);
        // Data not in yet: nothing to raise, straight to consulting.
        let step = tick(&mut sim, PhaseTimer::Growing);
        assert_eq!(step.to, SimPhase::ConsultingData);
        assert!(step.commands.is_empty());
        let step = arrive(
            &mut sim,
            snapshot(0.6, 0.3, 5.0, 0.0, 1.0, MidSeasonEventType::Pests),
        );
        assert_eq!(step.to, SimPhase::ConsultingData);
        assert_eq!(step.commands.len(), 1);
        // The draw is recorded even though the event can no longer be raised.
        assert_eq!(sim.mid_season_event(), MidSeasonEventType::Pests);
        assert!(sim.options().is_empty());
        let step = tick(&mut sim, PhaseTimer::Consulting);
        assert_eq!(step.to, SimPhase::MainChallenge);
        assert_eq!(sim.challenge(), ChallengeType::Drought);
    }

    #[test]
    fn challenge_decision_predicts_outcome() {
        let mut sim = planted(FarmType::SmallScale);
        arrive(
            &mut sim,
            snapshot(0.6, 0.3, 5.0, 0.0, 0.0, MidSeasonEventType::None),
        );
        tick(&mut sim, PhaseTimer::Planting);
        tick(&mut sim, PhaseTimer::Growing);
        tick(&mut sim, PhaseTimer::Consulting);
        assert_eq!(sim.phase(), SimPhase::MainChallenge);
        assert!(matches!(
            sim.advance(SimEvent::Choose(Choice::Decide(DecisionId::FirePrevention))),
            Err(SimError::NotOffered { .. })
        ));
        let step = sim
            .advance(SimEvent::Choose(Choice::Decide(DecisionId::IrrigationInvest)))
            .unwrap();
        assert_eq!(step.to, SimPhase::PredictingOutcome);
        assert!(sim.prediction().is_some());
        assert_eq!(sim.economy().expenses, Decimal::new(600, 0));
    }

    #[test]
    fn insufficient_funds_keeps_phase() {
        let mut sim = planted(FarmType::SmallScale);
        arrive(
            &mut sim,
            snapshot(0.5, 0.1, 2.0, 3.0, 1.0, MidSeasonEventType::Pests),
        );
        tick(&mut sim, PhaseTimer::Planting);
        tick(&mut sim, PhaseTimer::Growing);
        sim.advance(SimEvent::Choose(Choice::Decide(DecisionId::PestsSpray)))
            .unwrap();
        tick(&mut sim, PhaseTimer::Consulting);
        assert_eq!(sim.phase(), SimPhase::MainChallenge);
        assert_eq!(sim.challenge(), ChallengeType::WildfireRisk);
        // 500 left; firebreak costs 600.
        let before = sim.view();
        let err = sim
            .advance(SimEvent::Choose(Choice::Decide(DecisionId::FirePrevention)))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::InsufficientFunds {
                decision: DecisionId::FirePrevention,
                cost: 600,
                capital: Decimal::new(500, 0),
            }
        );
        assert_eq!(sim.view(), before);
        sim.advance(SimEvent::ChooseKey("fire_ignore".into()))
            .unwrap();
        assert_eq!(sim.phase(), SimPhase::PredictingOutcome);
    }

    #[test]
    fn unknown_key_resolves_as_free_decision() {
        let mut sim = planted(FarmType::SmallScale);
        arrive(
            &mut sim,
            snapshot(0.5, 0.5, 50.0, 0.0, 1.0, MidSeasonEventType::Pests),
        );
        tick(&mut sim, PhaseTimer::Planting);
        tick(&mut sim, PhaseTimer::Growing);
        let before = sim.snapshot().cloned();
        let step = sim
            .advance(SimEvent::ChooseKey("crop_rotation".into()))
            .unwrap();
        assert_eq!(step.to, SimPhase::ConsultingData);
        assert_eq!(sim.snapshot().cloned(), before);
        assert_eq!(sim.economy().working_capital, Decimal::new(800, 0));
    }

    #[test]
    fn harvest_then_replay_resets() {
        let mut sim = planted(FarmType::Industrial);
        arrive(&mut sim, quiet());
        tick(&mut sim, PhaseTimer::Planting);
        tick(&mut sim, PhaseTimer::Growing);
        tick(&mut sim, PhaseTimer::Consulting);
        let step = sim.advance(SimEvent::Harvest).unwrap();
        assert_eq!(step.to, SimPhase::Harvested);
        let report = sim.harvest().unwrap().clone();
        assert_eq!(report.expenses, Decimal::new(200, 0));
        assert_eq!(sim.economy().working_capital, report.final_capital);

        sim.advance(SimEvent::Replay).unwrap();
        let view = sim.view();
        assert_eq!(view.phase, SimPhase::FarmSetup);
        assert_eq!(view.economy.working_capital, Decimal::new(2500, 0));
        assert_eq!(view.economy.expenses, Decimal::ZERO);
        assert_eq!(view.economy.revenue, Decimal::ZERO);
        assert_eq!(view.economy.profit, Decimal::ZERO);
        assert_eq!(view.data, DataState::Pending);
        assert!(view.trend.is_empty());
        assert!(view.prediction.is_none());
        assert!(view.harvest.is_none());
        assert_eq!(view.challenge, ChallengeType::None);
    }

    #[test]
    fn stale_events_are_ignored_after_replay() {
        let mut sim = planted(FarmType::SmallScale);
        let old_epoch = sim.epoch();
        arrive(&mut sim, quiet());
        tick(&mut sim, PhaseTimer::Planting);
        tick(&mut sim, PhaseTimer::Growing);
        tick(&mut sim, PhaseTimer::Consulting);
        sim.advance(SimEvent::Harvest).unwrap();
        sim.advance(SimEvent::Replay).unwrap();
        let step = sim
            .advance(SimEvent::TimerElapsed {
                epoch: old_epoch,
                timer: PhaseTimer::Planting,
            })
            .unwrap();
        assert!(!step.changed_phase());
        let step = sim
            .advance(SimEvent::DataArrived {
                epoch: old_epoch,
                result: Ok(quiet()),
            })
            .unwrap();
        assert!(!step.changed_phase());
        assert!(sim.snapshot().is_none());
    }

    #[test]
    fn fetch_failure_returns_to_idle_without_charge() {
        let mut sim = planted(FarmType::SmallScale);
        tick(&mut sim, PhaseTimer::Planting);
        let epoch = sim.epoch();
        let step = sim
            .advance(SimEvent::DataArrived {
                epoch,
                result: Err(FetchError::Unavailable("uplink lost".into())),
            })
            .unwrap();
        assert_eq!(step.to, SimPhase::Idle);
        let view = sim.view();
        assert_eq!(view.economy.working_capital, Decimal::new(1000, 0));
        assert_eq!(view.economy.expenses, Decimal::ZERO);
        assert_eq!(
            view.last_error.as_deref(),
            Some("data simulation failed: uplink lost")
        );
        // The growing timer from the failed season no longer applies.
        let step = sim
            .advance(SimEvent::TimerElapsed {
                epoch,
                timer: PhaseTimer::Growing,
            })
            .unwrap();
        assert_eq!(step.to, SimPhase::Idle);
        // Retry.
        let step = sim.advance(SimEvent::Plant).unwrap();
        assert_eq!(step.to, SimPhase::Planting);
        assert!(sim.view().last_error.is_none());
        assert_eq!(sim.economy().working_capital, Decimal::new(800, 0));
    }

    #[test]
    fn actions_out_of_phase_are_rejected() {
        let mut sim = Simulation::new(SimConfig::default());
        assert_eq!(
            sim.advance(SimEvent::Plant),
            Err(SimError::InvalidAction {
                action: "plant",
                phase: SimPhase::FarmSetup
            })
        );
        assert!(sim.advance(SimEvent::Harvest).is_err());
        assert!(sim.advance(SimEvent::Replay).is_err());
        assert!(sim.advance(SimEvent::Choose(Choice::Pass)).is_err());
        let mut sim = planted(FarmType::SmallScale);
        assert!(sim
            .advance(SimEvent::SelectRegion("Iowa, USA".into()))
            .is_err());
        assert!(sim
            .advance(SimEvent::SelectFarmType(FarmType::Industrial))
            .is_err());
    }

    #[test]
    fn blank_selection_cannot_plant() {
        let mut sim = Simulation::new(SimConfig::default());
        sim.advance(SimEvent::SelectFarmType(FarmType::SmallScale))
            .unwrap();
        sim.advance(SimEvent::SelectRegion("  ".into())).unwrap();
        assert_eq!(sim.advance(SimEvent::Plant), Err(SimError::MissingSelection));
        assert_eq!(sim.phase(), SimPhase::Idle);
    }

    #[test]
    fn subscribers_see_each_step() {
        let mut sim = Simulation::new(SimConfig::default());
        let mut rx = sim.subscribe();
        sim.advance(SimEvent::SelectFarmType(FarmType::SmallScale))
            .unwrap();
        sim.advance(SimEvent::Plant).unwrap();
        assert_eq!(rx.try_recv().unwrap().phase, SimPhase::Idle);
        let v = rx.try_recv().unwrap();
        assert_eq!(v.phase, SimPhase::Planting);
        assert_eq!(v.economy.working_capital, Decimal::new(800, 0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn view_serializes_for_presentation() {
        let mut sim = planted(FarmType::SmallScale);
        arrive(&mut sim, quiet());
        let json = serde_json::to_value(sim.view()).unwrap();
        assert_eq!(json["phase"], "planting");
        assert_eq!(json["data"]["status"], "ready");
        assert_eq!(json["challenge"], "none");
    }

    proptest! {
        #[test]
        fn decisions_keep_snapshot_in_range(pick in 0usize..3,
                                            veg in 0.0f64..=1.0,
                                            moist in 0.0f64..=1.0) {
            let mut sim = planted(FarmType::Industrial);
            arrive(&mut sim, snapshot(veg, moist, 50.0, 2.0, 1.0, MidSeasonEventType::Pests));
            tick(&mut sim, PhaseTimer::Planting);
            tick(&mut sim, PhaseTimer::Growing);
            let options = sim.options();
            sim.advance(SimEvent::Choose(options[pick])).unwrap();
            let s = sim.snapshot().unwrap();
            prop_assert!((0.0..=1.0).contains(&s.vegetation_index));
            prop_assert!((0.0..=1.0).contains(&s.soil_moisture));
            prop_assert!(s.temperature_anomaly >= 0.0);
        }
    }
}
