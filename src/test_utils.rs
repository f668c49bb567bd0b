//! Fixtures shared by the unit tests.

use std::sync::Mutex;

use crate::{
    diagnostics::{Diagnostics, ProgressSnapshot, SearchObserver, SearchStats},
    heuristic::{MoveScorer, ScoreError},
    GameState, Move, Player, SeededRng, SmallBoard,
};

const X: Option<Player> = Some(Player::X);
const O: Option<Player> = Some(Player::O);

/// A full sub-board with no line: a draw.
pub fn drawn_board() -> SmallBoard {
    [X, O, X, X, O, O, O, X, X]
}

/// Sub-board 4 is drawn and the next move is sent there, so the player may
/// pick any empty cell of the other eight boards (72 moves).
pub fn state_with_drawn_board_4() -> GameState {
    let mut state = GameState::new();
    state.board[4] = drawn_board();
    state.next_board = Some(4);
    state
}

/// X to move, forced into sub-board 0 where only cell 8 is empty.
pub fn single_move_state() -> GameState {
    let mut state = GameState::new();
    state.board[0] = [X, O, X, X, O, O, O, X, None];
    state.next_board = Some(0);
    state
}

/// Scorer that fails on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingScorer;

impl MoveScorer for FailingScorer {
    fn score(&self, _state: &GameState, _mv: Move, _rng: &mut SeededRng) -> Result<f64, ScoreError> {
        Err(ScoreError::Failed("always fails".into()))
    }
}

#[derive(Debug, Default)]
struct Recorded {
    progress: Vec<ProgressSnapshot>,
    stats: Vec<SearchStats>,
    diagnostics: Vec<Diagnostics>,
}

/// Observer that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Recorded>,
}

impl RecordingObserver {
    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut events)
    }

    pub fn progress_count(&self) -> usize {
        self.with(|e| e.progress.len())
    }

    pub fn stats_count(&self) -> usize {
        self.with(|e| e.stats.len())
    }

    pub fn diagnostics_count(&self) -> usize {
        self.with(|e| e.diagnostics.len())
    }

    pub fn last_diagnostics(&self) -> Option<Diagnostics> {
        self.with(|e| e.diagnostics.last().cloned())
    }
}

impl SearchObserver for RecordingObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.with(|e| e.progress.push(snapshot.clone()));
    }

    fn on_stats(&self, stats: &SearchStats) {
        self.with(|e| e.stats.push(*stats));
    }

    fn on_diagnostics(&self, diagnostics: &Diagnostics) {
        self.with(|e| e.diagnostics.push(diagnostics.clone()));
    }
}
