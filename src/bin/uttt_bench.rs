//! uttt-bench - headless engine-vs-engine match runner
//!
//! Plays a series of full games between two players (a difficulty preset,
//! `random` or `greedy`), swapping sides every game, and writes a JSON report
//! with results and per-move timing.

use std::{fmt, path::PathBuf, str::FromStr, time::Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};

use uttt_mcts::{
    apply_move, greedy_move, random_move, Agent, ChooseOptions, Difficulty, GameResult, GameState,
    HeuristicScorer, Move, ParamOverrides, Player, PoolConfig, PoolStats, PresetTable, SeededRng,
};

/// Games still running after this many plies are stopped and scored as draws.
const MAX_PLIES: u32 = 200;

#[derive(Debug, Parser)]
#[command(name = "uttt-bench", about = "Play engine-vs-engine Ultimate Tic-Tac-Toe matches")]
struct Config {
    /// Number of games to play
    #[arg(long, default_value_t = 10)]
    games: u32,

    /// First player: easy, medium, hard, insane, random or greedy
    #[arg(long, default_value = "medium")]
    p1: PlayerKind,

    /// Second player
    #[arg(long, default_value = "random")]
    p2: PlayerKind,

    /// Per-move time budget in milliseconds, overriding the presets
    #[arg(long)]
    time: Option<u64>,

    /// Base seed; every move derives its own seed from it
    #[arg(long)]
    seed: Option<String>,

    /// TOML file replacing the built-in difficulty presets
    #[arg(long)]
    presets: Option<PathBuf>,

    /// Worker pool size (defaults to available parallelism minus one)
    #[arg(long)]
    workers: Option<usize>,

    /// Search on the main thread instead of the worker pool
    #[arg(long)]
    direct: bool,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log level (RUST_LOG takes priority)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.games == 0 {
            bail!("--games must be at least 1");
        }
        if self.workers == Some(0) {
            bail!("--workers must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerKind {
    Random,
    Greedy,
    Search(Difficulty),
}

impl FromStr for PlayerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(PlayerKind::Random),
            "greedy" => Ok(PlayerKind::Greedy),
            other => other
                .parse::<Difficulty>()
                .map(PlayerKind::Search)
                .map_err(|e| anyhow!("{e} (or random, greedy)")),
        }
    }
}

impl fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerKind::Random => f.write_str("random"),
            PlayerKind::Greedy => f.write_str("greedy"),
            PlayerKind::Search(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Timing {
    moves: u64,
    total_ms: f64,
    mean_ms: f64,
    max_ms: f64,
}

impl Timing {
    fn record(&mut self, ms: f64) {
        self.moves += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
        self.mean_ms = self.total_ms / self.moves as f64;
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    P1Win,
    P2Win,
    Draw,
    PlyCap,
    /// A player produced no move or an illegal one.
    Aborted { by: String, reason: String },
}

#[derive(Debug, Serialize)]
struct GameRecord {
    game: u32,
    /// Which configured player held X.
    x: &'static str,
    plies: u32,
    outcome: Outcome,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    games: u32,
    p1: String,
    p2: String,
    p1_wins: u32,
    p2_wins: u32,
    draws: u32,
    ply_cap_hits: u32,
    aborted: u32,
    p1_timing: Timing,
    p2_timing: Timing,
    pool: Option<PoolStats>,
    records: Vec<GameRecord>,
}

struct Match {
    agent: Agent,
    time: Option<u64>,
    seed: Option<String>,
    scorer: HeuristicScorer,
}

impl Match {
    fn pick(&self, kind: PlayerKind, state: &GameState, rng: &mut SeededRng, tag: &str) -> Result<Move> {
        match kind {
            PlayerKind::Random => Ok(random_move(state, rng)?),
            PlayerKind::Greedy => Ok(greedy_move(state, &self.scorer, rng)?),
            PlayerKind::Search(difficulty) => {
                let mut overrides = ParamOverrides::difficulty(difficulty);
                overrides.time_budget_ms = self.time;
                if let Some(seed) = &self.seed {
                    overrides.seed = Some(format!("{seed}-{tag}").into());
                }
                let chosen = self.agent.choose_move(state, &ChooseOptions::new(overrides))?;
                debug!(mv = %chosen.mv, source = ?chosen.source, iterations = chosen.stats.iterations, "searched");
                Ok(chosen.mv)
            }
        }
    }

    /// Plays one game with `x` moving first.
    fn play(&self, game: u32, x: PlayerKind, o: PlayerKind, timing: [&mut Timing; 2]) -> (u32, GameOver) {
        let [x_timing, o_timing] = timing;
        let mut rng = match &self.seed {
            Some(seed) => SeededRng::from_seed(format!("{seed}-g{game}")),
            None => SeededRng::from_entropy(),
        };
        let mut state = GameState::new();
        let mut plies = 0;

        while !state.is_over() {
            if plies >= MAX_PLIES {
                return (plies, GameOver::PlyCap);
            }
            let (kind, clock) = match state.current_player {
                Player::X => (x, &mut *x_timing),
                Player::O => (o, &mut *o_timing),
            };

            let started = Instant::now();
            let picked = self.pick(kind, &state, &mut rng, &format!("g{game}-p{plies}"));
            clock.record(started.elapsed().as_secs_f64() * 1000.0);

            let next = picked.and_then(|mv| {
                apply_move(&state, mv).with_context(|| format!("illegal move {mv}"))
            });
            match next {
                Ok(next) => state = next,
                Err(e) => {
                    warn!(game, player = %kind, error = %e, "game aborted");
                    return (plies, GameOver::Aborted(state.current_player, e.to_string()));
                }
            }
            plies += 1;
        }
        (plies, GameOver::Finished(state.result))
    }
}

enum GameOver {
    Finished(GameResult),
    PlyCap,
    Aborted(Player, String),
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;
    init_tracing(&config.log_level)?;

    let presets = match &config.presets {
        Some(path) => PresetTable::load(path)
            .with_context(|| format!("loading presets from {}", path.display()))?,
        None => PresetTable::default(),
    };

    let agent = if config.direct {
        Agent::direct()
    } else {
        let mut pool = PoolConfig::from_env();
        pool.size = config.workers;
        Agent::new(pool)
    };
    let agent = agent.with_presets(presets);
    info!(
        games = config.games,
        p1 = %config.p1,
        p2 = %config.p2,
        pooled = agent.has_pool(),
        "starting match"
    );

    let runner = Match {
        agent,
        time: config.time,
        seed: config.seed.clone(),
        scorer: HeuristicScorer::default(),
    };

    let mut report = Report {
        games: config.games,
        p1: config.p1.to_string(),
        p2: config.p2.to_string(),
        ..Default::default()
    };

    for game in 0..config.games {
        let p1_is_x = game % 2 == 0;
        let (plies, over) = if p1_is_x {
            runner.play(game, config.p1, config.p2, [&mut report.p1_timing, &mut report.p2_timing])
        } else {
            runner.play(game, config.p2, config.p1, [&mut report.p2_timing, &mut report.p1_timing])
        };

        let p1_seat = if p1_is_x { Player::X } else { Player::O };
        let label = |p: Player| if p == p1_seat { "p1" } else { "p2" };
        let outcome = match over {
            GameOver::Finished(GameResult::Won(p)) if p == p1_seat => {
                report.p1_wins += 1;
                Outcome::P1Win
            }
            GameOver::Finished(GameResult::Won(_)) => {
                report.p2_wins += 1;
                Outcome::P2Win
            }
            GameOver::Finished(_) => {
                report.draws += 1;
                Outcome::Draw
            }
            GameOver::PlyCap => {
                report.draws += 1;
                report.ply_cap_hits += 1;
                Outcome::PlyCap
            }
            GameOver::Aborted(p, reason) => {
                report.aborted += 1;
                Outcome::Aborted {
                    by: label(p).to_string(),
                    reason,
                }
            }
        };
        info!(game, plies, outcome = ?outcome, "game finished");
        report.records.push(GameRecord {
            game,
            x: label(Player::X),
            plies,
            outcome,
        });
    }

    report.pool = runner.agent.pool_stats();
    runner.agent.terminate();
    info!(
        p1_wins = report.p1_wins,
        p2_wins = report.p2_wins,
        draws = report.draws,
        aborted = report.aborted,
        "match finished"
    );

    let json = serde_json::to_string_pretty(&report)?;
    match &config.out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
