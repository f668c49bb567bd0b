//! High-level move selection: resolve parameters, run a search (on a worker
//! when possible, inline otherwise) and always come back with a legal move.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::{ConfigError, ParamOverrides, PresetTable},
    diagnostics::{Diagnostics, SearchObserver, SearchStats},
    dispatch::{run_with_budget, Budget, CancelToken},
    heuristic::MoveScorer,
    legal_moves,
    mcts::{Mcts, SearchError, SearchStatus},
    pool::{Job, PoolConfig, PoolError, PoolStats, RunOptions, WorkerPool},
    protocol::Response,
    utils::pick_random,
    GameState, Move, SearchParams, SeededRng,
};

/// Slack added to the time budget before a pooled request times out.
pub const POOL_TIMEOUT_SLACK_MS: u64 = 2000;

#[derive(Debug, Error)]
pub enum ChooseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Inputs of one move choice beyond the position itself.
#[derive(Clone, Default)]
pub struct ChooseOptions {
    pub overrides: ParamOverrides,
    pub cancel: Option<CancelToken>,
    /// Replaces the built-in scorer; forces inline execution.
    pub scorer: Option<Arc<dyn MoveScorer>>,
    /// Forces inline execution.
    pub observer: Option<Arc<dyn SearchObserver>>,
}

impl ChooseOptions {
    pub fn new(overrides: ParamOverrides) -> Self {
        ChooseOptions {
            overrides,
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn MoveScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn needs_inline(&self) -> bool {
        self.scorer.is_some() || self.observer.is_some()
    }
}

/// Where a chosen move came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveSource {
    /// Inline search on the calling thread.
    Search,
    /// Search on a pool worker.
    Worker,
    /// Random legal move after an abort or a failed search.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenMove {
    #[serde(rename = "move")]
    pub mv: Move,
    pub source: MoveSource,
    pub status: SearchStatus,
    pub stats: SearchStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl ChosenMove {
    fn fallback(state: &GameState, params: &SearchParams, status: SearchStatus) -> Result<Self, SearchError> {
        let mut rng = SeededRng::from_optional_seed(params.seed.as_ref());
        let mv = pick_random(&legal_moves(state), &mut rng).ok_or(SearchError::NoLegalMoves)?;
        Ok(ChosenMove {
            mv,
            source: MoveSource::Fallback,
            status,
            stats: SearchStats::default(),
            diagnostics: None,
        })
    }
}

/// Picks a move for the side to move, searching inline.
///
/// # Examples
/// ```rust
/// use uttt_mcts::{choose_move, legal_moves, ChooseOptions, Difficulty, GameState, ParamOverrides};
///
/// let state = GameState::new();
/// let options = ChooseOptions::new(ParamOverrides::difficulty(Difficulty::Easy).with_seed("s1"));
/// let mv = choose_move(&state, &options).expect("ongoing game");
/// assert!(legal_moves(&state).contains(&mv));
/// ```
pub fn choose_move(state: &GameState, options: &ChooseOptions) -> Result<Move, ChooseError> {
    Ok(choose_move_detailed(state, options)?.mv)
}

/// Like [`choose_move`], also returning the search stats and diagnostics.
///
/// # Errors
/// Invalid overrides, or a position without legal moves. Any other search
/// failure degrades to a random legal move.
pub fn choose_move_detailed(state: &GameState, options: &ChooseOptions) -> Result<ChosenMove, ChooseError> {
    let params = options.overrides.resolve()?;
    search_inline(state, params, options)
}

fn search_inline(state: &GameState, params: SearchParams, options: &ChooseOptions) -> Result<ChosenMove, ChooseError> {
    let budget = Budget::from_params(&params, options.cancel.clone());
    let result = run_with_budget(
        |token| {
            let mut mcts = Mcts::new(state, params.clone())?;
            if let Some(scorer) = &options.scorer {
                mcts = mcts.with_scorer(Arc::clone(scorer));
            }
            if let Some(observer) = &options.observer {
                mcts = mcts.with_observer(Arc::clone(observer));
            }
            mcts.run(token)
        },
        &budget,
    );

    match result {
        Ok(outcome) => Ok(ChosenMove {
            mv: outcome.mv,
            source: MoveSource::Search,
            status: outcome.status,
            stats: outcome.stats,
            diagnostics: outcome.diagnostics,
        }),
        Err(SearchError::NoLegalMoves) => Err(SearchError::NoLegalMoves.into()),
        Err(e) => {
            warn!(error = %e, "search failed, playing a random legal move");
            Ok(ChosenMove::fallback(state, &params, SearchStatus::Completed)?)
        }
    }
}

/// Move chooser that owns an optional worker pool and a preset table.
///
/// Requests with a custom scorer or observer always run inline, since
/// neither can cross to a worker.
pub struct Agent {
    pool: Option<WorkerPool>,
    presets: PresetTable,
}

impl Agent {
    /// Starts a pool with `config`, or runs inline if that is not possible.
    pub fn new(config: PoolConfig) -> Self {
        Agent {
            pool: WorkerPool::new(config),
            presets: PresetTable::default(),
        }
    }

    /// Agent that always searches on the calling thread.
    pub fn direct() -> Self {
        Agent {
            pool: None,
            presets: PresetTable::default(),
        }
    }

    pub fn with_presets(mut self, presets: PresetTable) -> Self {
        self.presets = presets;
        self
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(WorkerPool::stats)
    }

    pub fn choose_move(&self, state: &GameState, options: &ChooseOptions) -> Result<ChosenMove, ChooseError> {
        let params = options.overrides.resolve_with(&self.presets)?;
        if legal_moves(state).is_empty() {
            return Err(SearchError::NoLegalMoves.into());
        }

        let pool = match &self.pool {
            Some(pool) if !options.needs_inline() => pool,
            _ => return search_inline(state, params, options),
        };

        let run_options = RunOptions {
            signal: options.cancel.clone(),
            timeout: params
                .time_budget_ms
                .map(|ms| Duration::from_millis(ms.saturating_add(POOL_TIMEOUT_SLACK_MS))),
        };
        match pool.run(Job::new(state, params.clone()), run_options) {
            Ok(Response::Result {
                mv,
                status,
                stats,
                diagnostics,
                ..
            }) => Ok(ChosenMove {
                mv,
                source: MoveSource::Worker,
                status,
                stats,
                diagnostics,
            }),
            Ok(Response::Aborted { .. }) | Err(PoolError::Aborted) => {
                debug!("pooled search aborted, playing a random legal move");
                Ok(ChosenMove::fallback(state, &params, SearchStatus::Aborted)?)
            }
            Ok(Response::Error { error, .. }) => {
                warn!(%error, "worker reported an error, searching inline");
                search_inline(state, params, options)
            }
            Err(e) => {
                warn!(error = %e, "worker pool failed, searching inline");
                search_inline(state, params, options)
            }
        }
    }

    pub fn terminate(&self) {
        if let Some(pool) = &self.pool {
            pool.terminate();
        }
    }
}
