//! Timer and fetch driver around [`Simulation`].

use crate::machine::{Command, PhaseTimer, SimError, SimEvent, SimPhase, SimView, Simulation, Step};
use sim_core::{Choice, EnvironmentalSnapshot, FarmType, SimConfig};
use sim_data::{DataProvider, FetchError, FetchFuture};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

struct PendingTimer {
    deadline: Instant,
    seq: u64,
    epoch: u64,
    timer: PhaseTimer,
}

enum Wake {
    Data(Result<EnvironmentalSnapshot, FetchError>),
    Timer,
}

/// A playable session: the state machine plus the side effects it asks for.
pub struct Session<P: DataProvider> {
    sim: Simulation,
    provider: P,
    timers: Vec<PendingTimer>,
    next_seq: u64,
    fetch: Option<(u64, FetchFuture)>,
}

impl<P: DataProvider> Session<P> {
    pub fn new(config: SimConfig, provider: P) -> Self {
        Self {
            sim: Simulation::new(config),
            provider,
            timers: Vec::new(),
            next_seq: 0,
            fetch: None,
        }
    }

    pub fn phase(&self) -> SimPhase {
        self.sim.phase()
    }

    pub fn view(&self) -> SimView {
        self.sim.view()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimView> {
        self.sim.subscribe()
    }

    pub fn options(&self) -> Vec<Choice> {
        self.sim.options()
    }

    /// Whether a timer or fetch is still outstanding.
    pub fn has_pending_work(&self) -> bool {
        self.fetch.is_some() || !self.timers.is_empty()
    }

    /// Feed one event to the machine and carry out the commands it returns.
    pub fn dispatch(&mut self, event: SimEvent) -> Result<Step, SimError> {
        let step = self.sim.advance(event)?;
        let epoch = self.sim.epoch();
        self.timers.retain(|t| t.epoch == epoch);
        if matches!(self.fetch, Some((e, _)) if e != epoch) {
            debug!("dropping fetch from an earlier season");
            self.fetch = None;
        }
        for command in &step.commands {
            match command {
                Command::Fetch {
                    epoch,
                    region,
                    season,
                } => {
                    self.fetch = Some((*epoch, self.provider.fetch(region, season)));
                }
                Command::StartTimer {
                    epoch,
                    timer,
                    after,
                } => {
                    self.timers.push(PendingTimer {
                        deadline: Instant::now() + *after,
                        seq: self.next_seq,
                        epoch: *epoch,
                        timer: *timer,
                    });
                    self.next_seq += 1;
                }
            }
        }
        Ok(step)
    }

    pub fn select_farm_type(&mut self, farm_type: FarmType) -> Result<Step, SimError> {
        self.dispatch(SimEvent::SelectFarmType(farm_type))
    }

    pub fn select_region(&mut self, region: impl Into<String>) -> Result<Step, SimError> {
        self.dispatch(SimEvent::SelectRegion(region.into()))
    }

    pub fn select_season(&mut self, season: impl Into<String>) -> Result<Step, SimError> {
        self.dispatch(SimEvent::SelectSeason(season.into()))
    }

    pub fn plant(&mut self) -> Result<Step, SimError> {
        self.dispatch(SimEvent::Plant)
    }

    pub fn choose(&mut self, choice: Choice) -> Result<Step, SimError> {
        self.dispatch(SimEvent::Choose(choice))
    }

    /// Apply a decision by key. Returns false, with nothing changed, when
    /// the decision is refused.
    pub fn apply_decision(&mut self, key: &str) -> bool {
        match self.dispatch(SimEvent::ChooseKey(key.to_string())) {
            Ok(_) => true,
            Err(e) => {
                debug!(key, error = %e, "decision refused");
                false
            }
        }
    }

    pub fn pass(&mut self) -> Result<Step, SimError> {
        self.choose(Choice::Pass)
    }

    pub fn harvest(&mut self) -> Result<Step, SimError> {
        self.dispatch(SimEvent::Harvest)
    }

    pub fn replay(&mut self) -> Result<Step, SimError> {
        self.dispatch(SimEvent::Replay)
    }

    /// Wait for the fetch or the earliest timer and feed it to the machine.
    /// Returns `None` when nothing is pending.
    pub async fn next_event(&mut self) -> Result<Option<Step>, SimError> {
        if !self.has_pending_work() {
            return Ok(None);
        }
        let deadline = self.timers.iter().map(|t| t.deadline).min();
        let wake = {
            let fetch = async {
                match self.fetch.as_mut() {
                    Some((_, fut)) => fut.await,
                    None => std::future::pending().await,
                }
            };
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                result = fetch => Wake::Data(result),
                () = timer => Wake::Timer,
            }
        };
        let event = match wake {
            Wake::Data(result) => {
                let Some((epoch, _)) = self.fetch.take() else {
                    return Ok(None);
                };
                SimEvent::DataArrived { epoch, result }
            }
            Wake::Timer => {
                let Some(next) = self
                    .timers
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, t)| (t.deadline, t.seq))
                    .map(|(i, _)| i)
                else {
                    return Ok(None);
                };
                let t = self.timers.swap_remove(next);
                SimEvent::TimerElapsed {
                    epoch: t.epoch,
                    timer: t.timer,
                }
            }
        };
        self.dispatch(event).map(Some)
    }

    /// Drive timers and data until the season needs the player again.
    pub async fn run_until_input(&mut self) -> Result<SimPhase, SimError> {
        while !self.sim.phase().awaits_player() {
            if self.next_event().await?.is_none() {
                break;
            }
        }
        Ok(self.sim.phase())
    }
}
