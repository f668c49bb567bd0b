//! Search statistics, diagnostics snapshots and the observer hook.

use serde::{Deserialize, Serialize};

use crate::Move;

/// One root child in a diagnostics breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopMove {
    pub board: u8,
    pub cell: u8,
    pub visits: u32,
    /// Accumulated reward.
    pub wins: f64,
    /// Mean reward, `wins / visits`.
    pub value: f64,
}

impl TopMove {
    pub fn mv(&self) -> Move {
        Move::new(self.board, self.cell)
    }
}

/// Counters reported at the end of every search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: u32,
    pub elapsed_ms: f64,
    pub best_child_visits: u32,
    pub rollout_count: u32,
    pub total_rollout_steps: u64,
    pub early_cutoff_hits: u32,
    pub avg_rollout_length: f64,
    pub tt_hits: u32,
}

/// End-of-search snapshot for analysis tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// [`crate::state_id`] of the root state.
    pub state_id: String,
    pub iterations: u32,
    pub elapsed_ms: f64,
    pub rollout_count: u32,
    pub avg_rollout_length: f64,
    pub early_cutoff_hits: u32,
    pub best_child_visits: u32,
    pub top_moves: Vec<TopMove>,
    pub chosen_move: Move,
}

/// Throttled in-progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub timestamp: u64,
    pub iterations: u32,
    pub elapsed_ms: f64,
    pub top_moves: Vec<TopMove>,
}

/// Receives search events. Every method defaults to a no-op.
///
/// Observers run on the searching thread and must not block.
pub trait SearchObserver: Send + Sync {
    /// Called at most once per throttle interval while streaming is enabled.
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    fn on_stats(&self, _stats: &SearchStats) {}

    /// Called exactly once at the end of the search.
    fn on_diagnostics(&self, _diagnostics: &Diagnostics) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}
