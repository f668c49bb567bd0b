//! Static move scoring.
//!
//! [`MoveScorer`] is the injection point the search uses for move ordering,
//! progressive widening and early rollout cutoff. [`HeuristicScorer`] is the
//! built-in implementation: a weighted sum of tactical signals measured on
//! the position after the candidate move.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::{
    apply_move, evaluate_small_board, find_two_in_row, legal_moves, GameResult, GameState, Move,
    Player, RulesError, SeededRng, SmallBoardStatus,
};

/// Errors a scorer may report. The search treats them as "signal absent".
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("cannot score move: {0}")]
    Rules(#[from] RulesError),

    #[error("scorer failed: {0}")]
    Failed(String),
}

/// Scores a candidate move; higher is better for the side to move.
///
/// Implementations must be pure: no mutation of `state`, only `rng` advances.
pub trait MoveScorer: Send + Sync {
    fn score(&self, state: &GameState, mv: Move, rng: &mut SeededRng) -> Result<f64, ScoreError>;
}

/// Calibration weights of [`HeuristicScorer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicWeights {
    pub big_win: f64,
    pub local_win: f64,
    pub local_loss_penalty: f64,
    pub avoid_sending_opponent_win: f64,
    pub force_closed_board_bonus: f64,
    pub make_threat_bonus: f64,
    pub block_threat_bonus: f64,
    pub positional_multiplier: f64,
    pub mobility_multiplier: f64,
}

impl HeuristicWeights {
    pub const DEFAULT: HeuristicWeights = HeuristicWeights {
        big_win: 10_000.0,
        local_win: 500.0,
        local_loss_penalty: -400.0,
        avoid_sending_opponent_win: -800.0,
        force_closed_board_bonus: 30.0,
        make_threat_bonus: 50.0,
        block_threat_bonus: 40.0,
        positional_multiplier: 5.0,
        mobility_multiplier: 2.0,
    };
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        HeuristicWeights::DEFAULT
    }
}

/// Default jitter scale when none is configured.
pub const DEFAULT_RANDOMNESS: f64 = 0.05;

/// Mobility counts at most this many resulting legal moves.
const MOBILITY_CAP: usize = 10;

/// Center 3, corners 2, edges 1.
#[inline]
pub fn positional_value(cell: u8) -> f64 {
    match cell {
        4 => 3.0,
        0 | 2 | 6 | 8 => 2.0,
        _ => 1.0,
    }
}

/// The built-in tactical scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicScorer {
    pub weights: HeuristicWeights,
    /// Scale of the symmetric random jitter added to every score.
    pub randomness: f64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        HeuristicScorer {
            weights: HeuristicWeights::DEFAULT,
            randomness: DEFAULT_RANDOMNESS,
        }
    }
}

impl HeuristicScorer {
    pub fn new(randomness: f64) -> Self {
        HeuristicScorer {
            randomness,
            ..Default::default()
        }
    }

    pub fn with_weights(mut self, weights: HeuristicWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Score without the random jitter.
    pub fn tactical_score(&self, state: &GameState, mv: Move) -> Result<f64, ScoreError> {
        let w = &self.weights;
        let me = state.current_player;
        let opp = me.opponent();
        let next = apply_move(state, mv)?;
        let board = mv.board as usize;
        let mut score = 0.0;

        if next.result == GameResult::Won(me) {
            score += w.big_win;
        }

        match evaluate_small_board(&next.board[board]) {
            SmallBoardStatus::Won(p) if p == me => score += w.local_win,
            SmallBoardStatus::Won(_) => score += w.local_loss_penalty,
            _ => {}
        }

        if let Some(target) = next.next_board {
            if opponent_wins_in(&next, target, opp)? {
                score += w.avoid_sending_opponent_win;
            }
        }

        if evaluate_small_board(&next.board[mv.cell as usize]).is_closed() {
            score += w.force_closed_board_bonus;
        }

        let made = new_threats(state, &next, board, me);
        score += w.make_threat_bonus * made as f64;

        let blocked = blocked_threats(state, mv, opp);
        score += w.block_threat_bonus * blocked as f64;

        score += positional_value(mv.cell) * w.positional_multiplier;

        let mobility = legal_moves(&next).len().min(MOBILITY_CAP);
        score += mobility as f64 * w.mobility_multiplier;

        Ok(score)
    }
}

impl MoveScorer for HeuristicScorer {
    fn score(&self, state: &GameState, mv: Move, rng: &mut SeededRng) -> Result<f64, ScoreError> {
        let score = self.tactical_score(state, mv)?;
        Ok(score + rng.jitter(self.randomness))
    }
}

/// Whether `opp`, forced into `target`, has a move there that wins the game.
fn opponent_wins_in(state: &GameState, target: u8, opp: Player) -> Result<bool, ScoreError> {
    for reply in legal_moves(state).into_iter().filter(|m| m.board == target) {
        if apply_move(state, reply)?.result == GameResult::Won(opp) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Two-in-a-rows of `player` on `board` that exist after but not before the move.
fn new_threats(before: &GameState, after: &GameState, board: usize, player: Player) -> usize {
    let old = find_two_in_row(&before.board[board], player);
    find_two_in_row(&after.board[board], player)
        .into_iter()
        .filter(|t| !old.contains(t))
        .count()
}

/// Opponent two-in-a-rows whose completing cell this move occupies.
fn blocked_threats(before: &GameState, mv: Move, opp: Player) -> usize {
    find_two_in_row(&before.board[mv.board as usize], opp)
        .into_iter()
        .filter(|t| t.target == mv.cell)
        .count()
}

/// Outcome of a finished game from `root_player`'s point of view.
#[inline]
pub fn terminal_value(result: GameResult, root_player: Player) -> Option<f64> {
    match result {
        GameResult::Ongoing => None,
        GameResult::Draw => Some(0.5),
        GameResult::Won(p) if p == root_player => Some(1.0),
        GameResult::Won(_) => Some(0.0),
    }
}

/// Heuristic value of `state` in `[0, 1]`.
///
/// Finished games are valued for `root_player`. Otherwise the value is from
/// the side to move's point of view: the best move score available to it
/// against the best score the opponent would get on the same moves,
/// normalised into `[0, 1]`. It is not reoriented to `root_player`.
pub fn state_value(
    scorer: &dyn MoveScorer,
    state: &GameState,
    root_player: Player,
    rng: &mut SeededRng,
) -> Result<f64, ScoreError> {
    if let Some(v) = terminal_value(state.result, root_player) {
        return Ok(v);
    }
    let moves = legal_moves(state);
    if moves.is_empty() {
        return Ok(0.5);
    }

    let mut flipped = state.clone();
    flipped.current_player = state.current_player.opponent();

    let mut best_current = f64::NEG_INFINITY;
    for &mv in &moves {
        best_current = best_current.max(scorer.score(state, mv, rng)?);
    }
    let mut best_opponent = f64::NEG_INFINITY;
    for &mv in &moves {
        best_opponent = best_opponent.max(scorer.score(&flipped, mv, rng)?);
    }

    let denom = best_current.abs() + best_opponent.abs() + 1.0;
    let value = (0.5 + (best_current - best_opponent) / denom * 0.5).clamp(0.0, 1.0);
    trace!(best_current, best_opponent, value, "heuristic state value");

    Ok(value)
}
