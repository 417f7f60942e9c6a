#![deny(warnings)]

//! Headless CLI that plays Farm Navigator seasons with a scripted player.

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use sim_core::{ChallengeType, Choice, FarmType, MidSeasonEventType, SimConfig};
use sim_data::{CannedProvider, REGIONS, SEASONS};
use sim_econ::HarvestReport;
use sim_forecast::Prediction;
use sim_runtime::{Session, SimPhase, SimView};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// How the scripted player answers events and challenges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Strategy {
    /// Always the cheapest option.
    #[default]
    Frugal,
    /// The most expensive option still affordable.
    Invest,
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "frugal" => Ok(Strategy::Frugal),
            "invest" => Ok(Strategy::Invest),
            other => bail!("unknown strategy: {other} (expected frugal or invest)"),
        }
    }
}

#[derive(Debug)]
struct Args {
    farm: FarmType,
    region: String,
    season: String,
    seed: Option<u64>,
    config: Option<PathBuf>,
    strategy: Strategy,
    seasons: u32,
    instant: bool,
    json: bool,
    list: bool,
    version: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            farm: FarmType::default(),
            region: REGIONS[0].to_string(),
            season: SEASONS[0].to_string(),
            seed: None,
            config: None,
            strategy: Strategy::default(),
            seasons: 1,
            instant: false,
            json: false,
            list: false,
            version: false,
        }
    }
}

fn value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    it.next().ok_or_else(|| anyhow!("{flag} needs a value"))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--farm" => parsed.farm = value(&mut it, "--farm")?.parse()?,
            "--region" => parsed.region = value(&mut it, "--region")?,
            "--season" => parsed.season = value(&mut it, "--season")?,
            "--seed" => {
                parsed.seed = Some(value(&mut it, "--seed")?.parse().context("--seed")?)
            }
            "--config" => parsed.config = Some(value(&mut it, "--config")?.into()),
            "--strategy" => parsed.strategy = value(&mut it, "--strategy")?.parse()?,
            "--seasons" => {
                parsed.seasons = value(&mut it, "--seasons")?
                    .parse()
                    .context("--seasons")?
            }
            "--instant" => parsed.instant = true,
            "--json" => parsed.json = true,
            "--list" => parsed.list = true,
            "--version" => parsed.version = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str::<SimConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        cfg.rng_seed = seed;
    }
    if args.instant {
        cfg = SimConfig::instant(cfg.rng_seed);
    }
    Ok(cfg)
}

fn cost(choice: Choice) -> u32 {
    match choice {
        Choice::Decide(id) => id.cost(),
        Choice::Pass => 0,
    }
}

fn pick(strategy: Strategy, options: &[Choice], capital: Decimal) -> Option<Choice> {
    let cheapest = options.iter().copied().min_by_key(|c| cost(*c));
    match strategy {
        Strategy::Frugal => cheapest,
        Strategy::Invest => options
            .iter()
            .copied()
            .filter(|c| Decimal::from(cost(*c)) <= capital)
            .max_by_key(|c| cost(*c))
            .or(cheapest),
    }
}

#[derive(Debug, Serialize)]
struct SeasonSummary {
    season_no: u32,
    farm_type: FarmType,
    region: String,
    season: String,
    challenge: ChallengeType,
    briefing: &'static str,
    mid_season_event: MidSeasonEventType,
    /// Set only when the event was raised to the player.
    event_title: Option<&'static str>,
    timeline: Vec<SimPhase>,
    decisions: Vec<Choice>,
    prediction: Option<Prediction>,
    harvest: HarvestReport,
}

/// Record each phase change seen on the update channel.
fn drain_phases(updates: &mut broadcast::Receiver<SimView>, timeline: &mut Vec<SimPhase>) {
    loop {
        match updates.try_recv() {
            Ok(view) => {
                if timeline.last() != Some(&view.phase) {
                    info!(phase = ?view.phase, status = view.phase.status(), "phase entered");
                    timeline.push(view.phase);
                }
            }
            Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "view updates lagged"),
            Err(_) => break,
        }
    }
}

async fn play_season(
    session: &mut Session<CannedProvider>,
    updates: &mut broadcast::Receiver<SimView>,
    args: &Args,
    season_no: u32,
) -> Result<SeasonSummary> {
    if session.phase() == SimPhase::Harvested {
        session.replay()?;
    }
    session.select_farm_type(args.farm)?;
    session.select_region(args.region.as_str())?;
    session.select_season(args.season.as_str())?;
    session.plant()?;

    let mut decisions = Vec::new();
    let mut timeline = Vec::new();
    let mut raised = None;
    loop {
        let phase = session.run_until_input().await?;
        drain_phases(updates, &mut timeline);
        match phase {
            SimPhase::MidSeasonEvent | SimPhase::MainChallenge => {
                let view = session.view();
                if phase == SimPhase::MidSeasonEvent {
                    raised = Some(view.mid_season_event);
                }
                let options = session.options();
                let choice = pick(args.strategy, &options, view.economy.working_capital)
                    .ok_or_else(|| anyhow!("no options offered in {:?}", view.phase))?;
                info!(phase = ?view.phase, ?choice, "player decision");
                session.choose(choice)?;
                decisions.push(choice);
            }
            SimPhase::PredictingOutcome => {
                session.harvest()?;
            }
            SimPhase::Harvested => break,
            SimPhase::Idle => {
                let reason = session.view().last_error.unwrap_or_default();
                bail!("season {season_no} aborted: {reason}");
            }
            phase => bail!("season {season_no} stalled in {phase:?}"),
        }
    }

    let view = session.view();
    let harvest = view
        .harvest
        .ok_or_else(|| anyhow!("season {season_no} ended without a harvest"))?;
    Ok(SeasonSummary {
        season_no,
        farm_type: view.farm_type,
        region: view.region,
        season: view.season,
        challenge: view.challenge,
        briefing: view.challenge.briefing(),
        mid_season_event: view.mid_season_event,
        event_title: raised.map(MidSeasonEventType::title),
        timeline,
        decisions,
        prediction: view.prediction,
        harvest,
    })
}

fn summary_lines(s: &SeasonSummary) -> Vec<String> {
    let decisions: Vec<String> = s
        .decisions
        .iter()
        .map(|c| match c {
            Choice::Decide(id) => format!("{} (${})", id.label(), id.cost()),
            Choice::Pass => "Continue".to_string(),
        })
        .collect();
    let mut lines = vec![format!(
        "Season {} | {} | {} / {} | challenge: {} | event: {}",
        s.season_no, s.farm_type, s.region, s.season, s.challenge, s.mid_season_event
    )];
    lines.extend(s.timeline.iter().map(|p| format!("Status | {}", p.status())));
    if let Some(title) = s.event_title {
        lines.push(format!(
            "Event | {} {}",
            title,
            s.mid_season_event.description()
        ));
    }
    lines.push(format!("Alert | {}", s.briefing));
    lines.push(format!("Decisions | {}", decisions.join(", ")));
    if let Some(p) = &s.prediction {
        lines.push(format!("Forecast | score: {:.3} | {}", p.score, p.message()));
    }
    let h = &s.harvest;
    lines.push(format!(
        "KPI | {}: ${} | revenue: ${} | expenses: ${} | capital: ${} | health: {:.3} | volatility: {:.3}",
        h.outcome_label(),
        h.profit,
        h.revenue,
        h.expenses,
        h.final_capital,
        h.health_factor,
        h.market_volatility
    ));
    lines
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup; stdout is reserved for the report
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!(
            "farm-cli {} ({} {}, {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE"),
            env!("BUILD_PROFILE")
        );
        return Ok(());
    }
    if args.list {
        println!("Regions | {}", REGIONS.join(" | "));
        println!("Seasons | {}", SEASONS.join(" | "));
        return Ok(());
    }

    let cfg = load_config(&args)?;
    info!(
        strategy = ?args.strategy,
        seasons = args.seasons,
        seed = cfg.rng_seed,
        git_sha = env!("GIT_SHA"),
        "starting CLI"
    );

    let provider = CannedProvider::new(cfg.fetch_latency());
    let mut session = Session::new(cfg, provider);
    let mut updates = session.subscribe();
    let mut summaries = Vec::new();
    for season_no in 1..=args.seasons {
        summaries.push(play_season(&mut session, &mut updates, &args, season_no).await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for line in summaries.iter().flat_map(summary_lines) {
            println!("{line}");
        }
    }
    Ok(())
}
