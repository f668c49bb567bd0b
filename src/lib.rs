//! A Monte Carlo Tree Search engine for Ultimate Tic-Tac-Toe.
//!
//! The engine searches under a time budget, an iteration budget or both, and
//! can be cancelled cooperatively at any point. Seeded searches are fully
//! reproducible. Optional refinements include a transposition table over
//! Zobrist-hashed positions, heuristic move ordering with progressive
//! widening, and early rollout cutoff once the heuristic is confident.
//!
//! # Modules
//! - `game`: Rules of the game: states, moves, legality and transitions.
//! - `rng`: Deterministic seeded random stream.
//! - `hash`: Canonical state serialization, `state_id` and Zobrist hashing.
//! - `tt`: Bounded LRU transposition table.
//! - `heuristic`: Tactical move scoring and position evaluation.
//! - `tree`: Arena search tree and UCB1 selection.
//! - `config`: Search parameters, difficulty presets and overrides.
//! - `diagnostics`: Search statistics and the observer hook.
//! - `mcts`: The search itself.
//! - `dispatch`: Cancellation tokens and budgeted execution.
//! - `protocol`: Worker request and response messages.
//! - `pool`: Background worker pool.
//! - `baseline`: Random and greedy reference players.
//! - `agent`: Move selection entry points.
//! - `utils`: Contains general utility functions.
//! - `test_utils`: Fixtures shared by the unit tests.
//!
//! # Examples
//! ```rust
//! use uttt_mcts::{search, legal_moves, CancelToken, GameState, SearchError, SearchParams};
//!
//! fn main() -> Result<(), SearchError> {
//!     let state = GameState::new();
//!     let params = SearchParams::DEFAULT.with_iterations(200).with_seed("s1");
//!
//!     let outcome = search(&state, params, &CancelToken::new())?;
//!     assert!(legal_moves(&state).contains(&outcome.mv));
//!     println!("best move {} after {} iterations", outcome.mv, outcome.stats.iterations);
//!     Ok(())
//! }
//! ```

mod agent;
mod baseline;
mod config;
mod diagnostics;
mod dispatch;
mod game;
mod hash;
mod heuristic;
mod mcts;
mod pool;
mod protocol;
mod rng;
mod tree;
mod tt;
pub mod utils;

#[doc(hidden)]
pub mod test_utils;

pub use agent::*;
pub use baseline::*;
pub use config::*;
pub use diagnostics::*;
pub use dispatch::*;
pub use game::*;
pub use hash::*;
pub use heuristic::*;
pub use mcts::*;
pub use pool::*;
pub use protocol::*;
pub use rng::*;
pub use tree::*;
pub use tt::*;
