//! Monte Carlo Tree Search over Ultimate Tic-Tac-Toe positions.
//!
//! One [`Mcts`] owns one tree, one random stream and (optionally) one
//! transposition table; nothing is shared between searches. Each iteration
//! runs the four classic phases:
//!
//! 1. **Selection**: descend through fully expanded nodes by UCB1.
//! 2. **Expansion**: instantiate one untried move, chosen uniformly or, with
//!    a [`MoveScorer`], among the progressively widened top-K.
//! 3. **Simulation**: play a random or light rollout until the game ends or
//!    the heuristic is confident enough to cut it short.
//! 4. **Backpropagation**: credit the root-player outcome to every node on
//!    the path.
//!
//! The loop is cooperative. Cancellation is polled at every rollout step and
//! the wall clock every [`DEADLINE_CHECK_INTERVAL`] steps, so a search can
//! overrun its deadline by up to that many rollout steps. This is an accepted
//! imprecision, not a real-time guarantee.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    apply_move,
    diagnostics::{Diagnostics, ProgressSnapshot, SearchObserver, SearchStats, TopMove},
    dispatch::CancelToken,
    heuristic::{state_value, terminal_value, HeuristicScorer, MoveScorer},
    legal_moves,
    tree::{NodeId, SearchTree},
    utils::unix_millis,
    GameResult, GameState, Move, Player, RolloutPolicy, RulesError, SearchParams, SeededRng,
    TranspositionTable, TtEntry,
};

/// Rollout steps between two wall-clock checks.
pub const DEADLINE_CHECK_INTERVAL: u32 = 8;

/// Mixed into the search seed to derive the Zobrist seed.
const ZOBRIST_SEED_SALT: u32 = 0x9e37_79b9;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no legal moves available")]
    NoLegalMoves,

    #[error("rules error during search: {0}")]
    Rules(#[from] RulesError),
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// Iteration or time budget exhausted.
    Completed,
    /// The cancel token fired.
    Aborted,
    /// Exactly one legal move; no search was run.
    ShortCircuit,
}

/// Result of one search call.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub mv: Move,
    pub status: SearchStatus,
    pub stats: SearchStats,
    /// Absent only for [`SearchStatus::ShortCircuit`].
    pub diagnostics: Option<Diagnostics>,
}

/// Wall-clock deadline of one search.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `budget_ms` from now; `None`, or a budget past the clock's range, never expires.
    pub fn after(budget_ms: Option<u64>) -> Self {
        let started = Instant::now();
        Deadline {
            started,
            at: budget_ms.and_then(|ms| started.checked_add(Duration::from_millis(ms))),
        }
    }

    #[inline]
    pub fn reached(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

/// The stop conditions threaded through one iteration.
struct StopCheck<'a> {
    deadline: &'a Deadline,
    cancel: &'a CancelToken,
}

impl StopCheck<'_> {
    #[inline]
    fn cancelled(&self) -> Option<SearchStatus> {
        self.cancel.is_cancelled().then_some(SearchStatus::Aborted)
    }

    #[inline]
    fn expired(&self) -> Option<SearchStatus> {
        self.deadline.reached().then_some(SearchStatus::Completed)
    }

    #[inline]
    fn any(&self) -> Option<SearchStatus> {
        self.cancelled().or_else(|| self.expired())
    }
}

/// Result of one rollout.
enum Rollout {
    Finished {
        state: GameState,
        steps: u32,
        cutoff: Option<f64>,
    },
    Interrupted(SearchStatus),
}

#[derive(Debug, Default)]
struct Telemetry {
    rollouts: u32,
    steps: u64,
    cutoff_hits: u32,
    tt_hits: u32,
}

/// A single search instance.
///
/// # Examples
/// ```rust
/// use uttt_mcts::{legal_moves, CancelToken, GameState, Mcts, SearchParams, SearchError};
///
/// fn main() -> Result<(), SearchError> {
///     let state = GameState::new();
///     let params = SearchParams::DEFAULT.with_iterations(200).with_seed("doc");
///     let outcome = Mcts::new(&state, params)?.run(&CancelToken::new())?;
///     assert!(legal_moves(&state).contains(&outcome.mv));
///     assert_eq!(outcome.stats.iterations, 200);
///     Ok(())
/// }
/// ```
pub struct Mcts {
    root_state: GameState,
    root_player: Player,
    root_moves: Vec<Move>,
    params: SearchParams,
    scorer: Option<Arc<dyn MoveScorer>>,
    observer: Option<Arc<dyn SearchObserver>>,
    rng: SeededRng,
    tree: SearchTree,
    tt: Option<TranspositionTable>,
    iterations: u32,
    telemetry: Telemetry,
}

impl Mcts {
    /// Prepares a search of `state`.
    ///
    /// The built-in heuristic scorer is installed when `params.use_heuristic`
    /// is set; [`with_scorer`](Self::with_scorer) replaces it.
    ///
    /// # Errors
    /// [`SearchError::NoLegalMoves`] if `state` has no legal move.
    pub fn new(state: &GameState, params: SearchParams) -> Result<Self, SearchError> {
        let root_moves = legal_moves(state);
        if root_moves.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }

        let rng = SeededRng::from_optional_seed(params.seed.as_ref());
        let tt = params.use_transposition_table.then(|| {
            let zobrist_seed = params.seed.as_ref().map(|s| s.to_u32() ^ ZOBRIST_SEED_SALT);
            TranspositionTable::new(params.tt_max_entries, zobrist_seed)
        });
        let scorer = params
            .use_heuristic
            .then(|| Arc::new(HeuristicScorer::new(params.randomness)) as Arc<dyn MoveScorer>);

        Ok(Mcts {
            root_state: state.clone(),
            root_player: state.current_player,
            tree: SearchTree::new(root_moves.clone()),
            root_moves,
            params,
            scorer,
            observer: None,
            rng,
            tt,
            iterations: 0,
            telemetry: Telemetry::default(),
        })
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn MoveScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replaces the generator derived from `params.seed`.
    pub fn with_rng(mut self, rng: SeededRng) -> Self {
        self.rng = rng;
        self
    }

    #[inline]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    #[inline]
    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    #[inline]
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Runs until the iteration budget, the time budget or `cancel` stops it.
    ///
    /// Cancellation is not an error: the most visited root child so far is
    /// returned, or a random legal move if nothing was expanded yet.
    ///
    /// # Errors
    /// Only rules errors, which indicate an engine bug.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<SearchOutcome, SearchError> {
        if let [only] = self.root_moves.as_slice() {
            let only = *only;
            debug!(mv = %only, "single legal move, search skipped");
            return Ok(SearchOutcome {
                mv: only,
                status: SearchStatus::ShortCircuit,
                stats: SearchStats::default(),
                diagnostics: None,
            });
        }

        let deadline = Deadline::after(self.params.time_budget_ms);
        let stop = StopCheck {
            deadline: &deadline,
            cancel,
        };
        let mut status = SearchStatus::Completed;
        let mut last_progress: Option<Instant> = None;

        while self.iterations < self.params.iteration_budget {
            if let Some(s) = stop.any() {
                status = s;
                break;
            }
            if let Err(s) = self.iterate(&stop)? {
                status = s;
                break;
            }
            self.iterations += 1;
            self.maybe_emit_progress(&deadline, &mut last_progress);
        }

        Ok(self.finish(status, &deadline))
    }

    /// One selection/expansion/simulation/backpropagation pass.
    ///
    /// # Returns
    /// `Err(status)` when a stop condition interrupted the pass; nothing is
    /// backpropagated in that case.
    fn iterate(&mut self, stop: &StopCheck) -> Result<Result<(), SearchStatus>, SearchError> {
        let mut node = self.tree.root();
        let mut state = self.root_state.clone();

        // Selection
        while self.tree.get(node).is_fully_expanded() && !self.tree.get(node).children.is_empty() {
            if let Some(s) = stop.any() {
                return Ok(Err(s));
            }
            let Some(child) = self.tree.select_child(node, self.params.exploration) else {
                break;
            };
            if let Some(mv) = self.tree.get(child).mv {
                state = apply_move(&state, mv)?;
            }
            node = child;
        }

        // Expansion
        if !self.tree.get(node).untried.is_empty() {
            let index = self.pick_expansion(node, &state);
            let mv = self.tree.get_mut(node).untried.remove(index);
            state = apply_move(&state, mv)?;
            let untried = legal_moves(&state);
            node = self.tree.add_child(node, mv, untried);
            trace!(mv = %mv, node = node.index(), "expanded");
        }

        // Simulation
        let (final_state, steps, cutoff) = match self.rollout(state, stop)? {
            Rollout::Finished {
                state,
                steps,
                cutoff,
            } => (state, steps, cutoff),
            Rollout::Interrupted(s) => return Ok(Err(s)),
        };

        self.telemetry.rollouts += 1;
        self.telemetry.steps += steps as u64;
        if cutoff.is_some() {
            self.telemetry.cutoff_hits += 1;
        }

        let reward = match cutoff {
            Some(value) => value,
            None => self.terminal_reward(&final_state),
        };

        // Backpropagation
        self.tree.backpropagate(node, reward);
        Ok(Ok(()))
    }

    /// Index into the node's untried moves of the move to expand.
    fn pick_expansion(&mut self, node: NodeId, state: &GameState) -> usize {
        let count = self.tree.get(node).untried.len();
        let Some(scorer) = self.scorer.clone() else {
            return self.rng.pick_index(count);
        };

        let mut scored = Vec::with_capacity(count);
        for (i, &mv) in self.tree.get(node).untried.iter().enumerate() {
            match scorer.score(state, mv, &mut self.rng) {
                Ok(score) => scored.push((i, score)),
                Err(e) => {
                    debug!(error = %e, "move scoring failed, expanding uniformly");
                    return self.rng.pick_index(count);
                }
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let parent_visits = self
            .tree
            .get(node)
            .parent
            .map_or(1, |p| self.tree.get(p).visits.max(1));
        let widened = (parent_visits as f64).powf(self.params.widening_alpha)
            * self.params.widening_base(count);
        let k = (widened.floor() as usize).clamp(1, count);

        scored[self.rng.pick_index(k)].0
    }

    fn rollout(&mut self, mut state: GameState, stop: &StopCheck) -> Result<Rollout, SearchError> {
        let scorer = self.scorer.clone();
        let cutoff = self.params.early_cutoff.filter(|_| scorer.is_some());
        let mut steps = 0u32;

        loop {
            if let Some(s) = stop.cancelled() {
                return Ok(Rollout::Interrupted(s));
            }
            if steps % DEADLINE_CHECK_INTERVAL == 0 {
                if let Some(s) = stop.expired() {
                    return Ok(Rollout::Interrupted(s));
                }
            }

            let moves = legal_moves(&state);
            if moves.is_empty() {
                break;
            }
            let mv = match self.params.rollout {
                RolloutPolicy::Random => moves[self.rng.pick_index(moves.len())],
                RolloutPolicy::Light => self.light_move(&state, &moves)?,
            };
            state = apply_move(&state, mv)?;
            steps += 1;
            if state.is_over() {
                break;
            }

            if let (Some(cutoff), Some(scorer)) = (cutoff, scorer.as_deref()) {
                if steps >= cutoff.depth {
                    match state_value(scorer, &state, self.root_player, &mut self.rng) {
                        Ok(value) if cutoff.is_decisive(value) => {
                            return Ok(Rollout::Finished {
                                state,
                                steps,
                                cutoff: Some(value),
                            });
                        }
                        Ok(_) => {}
                        Err(e) => trace!(error = %e, "cutoff evaluation failed"),
                    }
                }
            }
        }

        Ok(Rollout::Finished {
            state,
            steps,
            cutoff: None,
        })
    }

    /// Immediate win if any, else a move that does not hand the opponent
    /// an immediate win, else uniform.
    fn light_move(&mut self, state: &GameState, moves: &[Move]) -> Result<Move, SearchError> {
        let me = state.current_player;
        let opp = me.opponent();

        let mut safe = Vec::with_capacity(moves.len());
        for &mv in moves {
            let next = apply_move(state, mv)?;
            if next.result == GameResult::Won(me) {
                return Ok(mv);
            }
            if !self.has_winning_reply(&next, opp)? {
                safe.push(mv);
            }
        }

        let pool = if safe.is_empty() { moves } else { &safe[..] };
        Ok(pool[self.rng.pick_index(pool.len())])
    }

    fn has_winning_reply(&self, state: &GameState, player: Player) -> Result<bool, SearchError> {
        if state.is_over() {
            return Ok(false);
        }
        for reply in legal_moves(state) {
            if apply_move(state, reply)?.result == GameResult::Won(player) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Outcome of a finished rollout, memoised in the transposition table.
    fn terminal_reward(&mut self, state: &GameState) -> f64 {
        let value = terminal_value(state.result, self.root_player).unwrap_or(0.5);
        let Some(tt) = self.tt.as_mut() else {
            return value;
        };

        let key = tt.key(state);
        match tt.get_by_key(key) {
            Some(entry) => {
                self.telemetry.tt_hits += 1;
                entry.value
            }
            None => {
                tt.set_by_key(key, TtEntry { value, visits: 1 });
                value
            }
        }
    }

    fn top_moves(&self, n: usize) -> Vec<TopMove> {
        self.tree
            .top_children(self.tree.root(), n)
            .into_iter()
            .filter_map(|id| {
                let node = self.tree.get(id);
                node.mv.map(|mv| TopMove {
                    board: mv.board,
                    cell: mv.cell,
                    visits: node.visits,
                    wins: node.reward,
                    value: node.value(),
                })
            })
            .collect()
    }

    fn maybe_emit_progress(&self, deadline: &Deadline, last: &mut Option<Instant>) {
        if !self.params.diagnostics_streaming {
            return;
        }
        let Some(observer) = self.observer.as_deref() else {
            return;
        };
        let throttle = Duration::from_millis(self.params.diagnostics_throttle_ms);
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < throttle) {
            return;
        }
        *last = Some(now);
        observer.on_progress(&ProgressSnapshot {
            timestamp: unix_millis(),
            iterations: self.iterations,
            elapsed_ms: deadline.elapsed_ms(),
            top_moves: self.top_moves(self.params.diagnostics_top_n),
        });
    }

    fn stats(&self, elapsed_ms: f64, best_child_visits: u32) -> SearchStats {
        let t = &self.telemetry;
        SearchStats {
            iterations: self.iterations,
            elapsed_ms,
            best_child_visits,
            rollout_count: t.rollouts,
            total_rollout_steps: t.steps,
            early_cutoff_hits: t.cutoff_hits,
            avg_rollout_length: if t.rollouts > 0 {
                t.steps as f64 / t.rollouts as f64
            } else {
                0.0
            },
            tt_hits: t.tt_hits,
        }
    }

    fn finish(&mut self, status: SearchStatus, deadline: &Deadline) -> SearchOutcome {
        let elapsed_ms = deadline.elapsed_ms();
        let best = self
            .tree
            .most_visited_child(self.tree.root())
            .and_then(|id| self.tree.get(id).mv.map(|mv| (mv, self.tree.get(id).visits)));

        let (mv, best_child_visits) = match best {
            Some(found) => found,
            None => {
                debug!("no expanded root child, falling back to a random legal move");
                let i = self.rng.pick_index(self.root_moves.len());
                (self.root_moves[i], 0)
            }
        };

        let stats = self.stats(elapsed_ms, best_child_visits);
        let diagnostics = Diagnostics {
            timestamp: unix_millis(),
            state_id: crate::state_id(&self.root_state),
            iterations: stats.iterations,
            elapsed_ms,
            rollout_count: stats.rollout_count,
            avg_rollout_length: stats.avg_rollout_length,
            early_cutoff_hits: stats.early_cutoff_hits,
            best_child_visits,
            top_moves: self.top_moves(self.params.diagnostics_top_n),
            chosen_move: mv,
        };

        if let Some(observer) = self.observer.as_deref() {
            observer.on_stats(&stats);
            observer.on_diagnostics(&diagnostics);
        }

        debug!(
            mv = %mv,
            ?status,
            iterations = stats.iterations,
            elapsed_ms,
            cutoff_hits = stats.early_cutoff_hits,
            tt_hits = stats.tt_hits,
            "search finished"
        );

        SearchOutcome {
            mv,
            status,
            stats,
            diagnostics: Some(diagnostics),
        }
    }
}

/// Runs a complete search of `state` with the built-in scorer settings.
pub fn search(
    state: &GameState,
    params: SearchParams,
    cancel: &CancelToken,
) -> Result<SearchOutcome, SearchError> {
    Mcts::new(state, params)?.run(cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        heuristic::ScoreError,
        test_utils::{single_move_state, state_with_drawn_board_4, FailingScorer, RecordingObserver},
        EarlyCutoff,
    };

    type TestResult = Result<(), SearchError>;

    fn params(iterations: u32, seed: &str) -> SearchParams {
        SearchParams::DEFAULT.with_iterations(iterations).with_seed(seed)
    }

    #[test]
    fn test_no_legal_moves() {
        let mut state = GameState::new();
        state.result = GameResult::Draw;
        assert!(matches!(
            Mcts::new(&state, SearchParams::DEFAULT),
            Err(SearchError::NoLegalMoves)
        ));
    }

    #[test]
    fn test_single_move_short_circuit() -> TestResult {
        let state = single_move_state();
        let observer = Arc::new(RecordingObserver::default());
        let outcome = Mcts::new(&state, params(100, "one"))?
            .with_observer(observer.clone())
            .run(&CancelToken::new())?;

        assert_eq!(outcome.mv, Move::new(0, 8));
        assert_eq!(outcome.status, SearchStatus::ShortCircuit);
        assert_eq!(outcome.stats.iterations, 0);
        assert!(outcome.diagnostics.is_none());
        assert_eq!(observer.diagnostics_count(), 0);
        Ok(())
    }

    #[test]
    fn test_iteration_budget_exact() -> TestResult {
        let mut mcts = Mcts::new(&GameState::new(), params(37, "budget"))?;
        let outcome = mcts.run(&CancelToken::new())?;

        assert_eq!(outcome.status, SearchStatus::Completed);
        assert_eq!(outcome.stats.iterations, 37);
        assert_eq!(outcome.stats.rollout_count, 37);
        assert_eq!(mcts.tree().get(mcts.tree().root()).visits, 37);
        Ok(())
    }

    #[test]
    fn test_deterministic_with_seed() -> TestResult {
        let state = apply_move(&GameState::new(), Move::new(4, 4))?;
        let configs = [
            params(300, "det"),
            params(60, "det").with_rollout(RolloutPolicy::Light),
            params(100, "det")
                .with_heuristic(true, 0.1)
                .with_transposition_table(true, 64),
        ];
        for p in configs {
            let a = search(&state, p.clone(), &CancelToken::new())?;
            let b = search(&state, p, &CancelToken::new())?;
            assert_eq!(a.mv, b.mv);
            assert_eq!(a.stats.rollout_count, b.stats.rollout_count);
            assert_eq!(
                a.diagnostics.map(|d| d.top_moves),
                b.diagnostics.map(|d| d.top_moves)
            );
        }
        Ok(())
    }

    #[test]
    fn test_legal_across_options() -> TestResult {
        let mut state = GameState::new();
        for mv in [Move::new(4, 0), Move::new(0, 4), Move::new(4, 8)] {
            state = apply_move(&state, mv)?;
        }
        let legal = legal_moves(&state);
        let configs = [
            params(50, "a"),
            params(20, "b").with_rollout(RolloutPolicy::Light),
            params(50, "c").with_heuristic(true, 0.0),
            params(50, "d").with_transposition_table(true, 8),
            params(50, "e")
                .with_heuristic(true, 0.5)
                .with_widening(Some(1.0), 0.0)
                .with_exploration(0.0),
            params(0, "f"),
        ];
        for p in configs {
            let outcome = search(&state, p, &CancelToken::new())?;
            assert!(legal.contains(&outcome.mv));
        }
        Ok(())
    }

    #[test]
    fn test_zero_iterations_falls_back_to_random() -> TestResult {
        let outcome = search(&GameState::new(), params(0, "zero"), &CancelToken::new())?;
        assert!(legal_moves(&GameState::new()).contains(&outcome.mv));
        assert_eq!(outcome.stats.best_child_visits, 0);
        assert!(outcome.diagnostics.is_some_and(|d| d.top_moves.is_empty()));
        Ok(())
    }

    #[test]
    fn test_budget_monotonic() -> TestResult {
        let small = search(&GameState::new(), params(40, "mono"), &CancelToken::new())?;
        let large = search(&GameState::new(), params(160, "mono"), &CancelToken::new())?;
        assert!(large.stats.iterations >= small.stats.iterations);
        Ok(())
    }

    #[test]
    fn test_time_budget_adherence() -> TestResult {
        let p = SearchParams::DEFAULT
            .with_iterations(u32::MAX)
            .with_time_budget_ms(Some(100))
            .with_seed("time");
        let started = Instant::now();
        let outcome = search(&GameState::new(), p, &CancelToken::new())?;

        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(outcome.status, SearchStatus::Completed);
        assert!(outcome.stats.iterations > 0);
        Ok(())
    }

    #[test]
    fn test_pre_cancelled() -> TestResult {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = search(&GameState::new(), params(1000, "pre"), &cancel)?;

        assert_eq!(outcome.status, SearchStatus::Aborted);
        assert_eq!(outcome.stats.iterations, 0);
        assert!(legal_moves(&GameState::new()).contains(&outcome.mv));
        Ok(())
    }

    #[test]
    fn test_cancel_latency() -> TestResult {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let p = SearchParams::DEFAULT
            .with_iterations(u32::MAX)
            .with_time_budget_ms(Some(10_000))
            .with_rollout(RolloutPolicy::Light);
        let started = Instant::now();
        let outcome = search(&GameState::new(), p, &cancel)?;
        let _ = canceller.join();

        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(outcome.status, SearchStatus::Aborted);
        assert!(legal_moves(&GameState::new()).contains(&outcome.mv));
        Ok(())
    }

    #[test]
    fn test_early_cutoff_hits() -> TestResult {
        let state = apply_move(&GameState::new(), Move::new(4, 4))?;
        let base = params(500, "cutoff").with_heuristic(true, 0.05);

        let with_cutoff = base.clone().with_early_cutoff(Some(EarlyCutoff {
            depth: 2,
            confidence: 0.6,
        }));
        let without = base.with_early_cutoff(None);

        let hits = search(&state, with_cutoff, &CancelToken::new())?.stats.early_cutoff_hits;
        let baseline = search(&state, without, &CancelToken::new())?.stats.early_cutoff_hits;
        assert_eq!(baseline, 0);
        assert!(hits > 0);
        Ok(())
    }

    /// Scores every X move 100 and every O move 0.
    struct FavoursX;

    impl MoveScorer for FavoursX {
        fn score(&self, state: &GameState, _mv: Move, _rng: &mut SeededRng) -> Result<f64, ScoreError> {
            Ok(if state.current_player == Player::X { 100.0 } else { 0.0 })
        }
    }

    #[test]
    fn test_cutoff_value_is_backpropagated() -> TestResult {
        // Depth-1 rollouts from the opening always stop with X to move.
        let p = params(40, "decisive").with_early_cutoff(Some(EarlyCutoff {
            depth: 1,
            confidence: 0.9,
        }));
        let mut mcts = Mcts::new(&GameState::new(), p)?.with_scorer(Arc::new(FavoursX));
        let outcome = mcts.run(&CancelToken::new())?;

        let expected = 0.5 + 100.0 / 101.0 * 0.5;
        assert_eq!(outcome.stats.early_cutoff_hits, 40);
        assert_eq!(outcome.stats.total_rollout_steps, 40);
        let root = mcts.tree().get(mcts.tree().root());
        assert_eq!(root.visits, 40);
        assert!((root.reward - 40.0 * expected).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_cutoff_needs_scorer() -> TestResult {
        let p = params(100, "noscorer").with_early_cutoff(Some(EarlyCutoff {
            depth: 1,
            confidence: 0.6,
        }));
        let outcome = search(&GameState::new(), p, &CancelToken::new())?;
        assert_eq!(outcome.stats.early_cutoff_hits, 0);
        Ok(())
    }

    #[test]
    fn test_failing_scorer_degrades() -> TestResult {
        let state = GameState::new();
        let outcome = Mcts::new(&state, params(100, "fail"))?
            .with_scorer(Arc::new(FailingScorer))
            .run(&CancelToken::new())?;

        assert!(legal_moves(&state).contains(&outcome.mv));
        assert_eq!(outcome.stats.iterations, 100);
        assert_eq!(outcome.stats.early_cutoff_hits, 0);
        Ok(())
    }

    #[test]
    fn test_drawn_board_forced() -> TestResult {
        let state = state_with_drawn_board_4();
        let outcome = search(&state, params(100, "drawn"), &CancelToken::new())?;
        assert_ne!(outcome.mv.board, 4);
        assert!(legal_moves(&state).contains(&outcome.mv));
        Ok(())
    }

    #[test]
    fn test_diagnostics_final() -> TestResult {
        let state = GameState::new();
        let observer = Arc::new(RecordingObserver::default());
        let mut p = params(120, "diag");
        p.diagnostics_top_n = 3;
        let outcome = Mcts::new(&state, p)?
            .with_observer(observer.clone())
            .run(&CancelToken::new())?;

        assert_eq!(observer.progress_count(), 0);
        assert_eq!(observer.diagnostics_count(), 1);
        let d = observer.last_diagnostics().expect("diagnostics emitted");
        assert_eq!(d.chosen_move, outcome.mv);
        assert_eq!(d.state_id, crate::state_id(&state));
        assert_eq!(d.iterations, 120);
        assert!(d.top_moves.len() <= 3);
        assert!(d.top_moves.windows(2).all(|w| w[0].visits >= w[1].visits));
        assert_eq!(d.top_moves[0].mv(), outcome.mv);
        assert_eq!(d.best_child_visits, d.top_moves[0].visits);
        Ok(())
    }

    #[test]
    fn test_diagnostics_streaming() -> TestResult {
        let observer = Arc::new(RecordingObserver::default());
        let p = params(20, "stream").with_streaming(true, 0);
        Mcts::new(&GameState::new(), p)?
            .with_observer(observer.clone())
            .run(&CancelToken::new())?;

        assert_eq!(observer.progress_count(), 20);
        assert_eq!(observer.diagnostics_count(), 1);

        let observer = Arc::new(RecordingObserver::default());
        let p = params(20, "stream").with_streaming(true, 60_000);
        Mcts::new(&GameState::new(), p)?
            .with_observer(observer.clone())
            .run(&CancelToken::new())?;
        assert_eq!(observer.progress_count(), 1);
        Ok(())
    }

    #[test]
    fn test_transposition_hits_counted() -> TestResult {
        let p = params(400, "tt").with_transposition_table(true, 1000);
        let outcome = search(&GameState::new(), p, &CancelToken::new())?;
        assert!(outcome.stats.tt_hits <= outcome.stats.rollout_count);
        Ok(())
    }
}
