//! State fingerprinting.
//!
//! Two independent schemes:
//! - [`state_id`]: a short hex id over a canonical serialization, used to
//!   correlate diagnostics with history entries outside the search.
//! - [`ZobristTable`]: XOR of per-(sub-board, cell, player) constants plus a
//!   constant for the forced-board indicator, used as the transposition key.
//!
//! Zobrist keys are 32 bits and the table stores no verification key, so two
//! different positions can share a key. A collision makes the transposition
//! table return another position's cached value. This is accepted: it costs
//! search quality in rare cases, never legality of the chosen move.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{GameResult, GameState, Player, SeededRng, SmallBoard};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Version tag written into every [`SerializedState`].
pub const SERIALIZED_STATE_VERSION: u32 = 1;

/// Versioned, self-describing snapshot of a [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedState {
    pub version: u32,
    pub board: [SmallBoard; 9],
    pub current_player: Player,
    pub next_board: Option<u8>,
    pub result: GameResult,
}

pub fn serialize_state(state: &GameState) -> SerializedState {
    SerializedState {
        version: SERIALIZED_STATE_VERSION,
        board: state.board,
        current_player: state.current_player,
        next_board: state.next_board,
        result: state.result,
    }
}

pub fn deserialize_state(serialized: &SerializedState) -> GameState {
    GameState {
        board: serialized.board,
        current_player: serialized.current_player,
        next_board: serialized.next_board.filter(|&b| b < 9),
        result: serialized.result,
    }
}

/// 32-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |h, &b| {
        (h ^ b as u32).wrapping_mul(FNV_PRIME)
    })
}

/// Short, stable identifier (8 hex chars) for a state.
///
/// Structurally equal states always get the same id.
///
/// # Examples
/// ```rust
/// use uttt_mcts::{state_id, GameState};
/// let id = state_id(&GameState::new());
/// assert_eq!(id.len(), 8);
/// assert_eq!(id, state_id(&GameState::new()));
/// ```
pub fn state_id(state: &GameState) -> String {
    let canonical = serde_json::to_vec(&serialize_state(state)).unwrap_or_default();
    format!("{:08x}", fnv1a(&canonical))
}

/// Number of piece constants: 9 sub-boards x 9 cells x 2 players.
const PIECE_KEYS: usize = 9 * 9 * 2;
/// Forced-board sentinels: "no constraint" plus boards 0..9.
const CONSTRAINT_KEYS: usize = 10;

/// Random constants for Zobrist hashing, built once per search.
#[derive(Debug, Clone)]
pub struct ZobristTable {
    keys: [u32; PIECE_KEYS + CONSTRAINT_KEYS],
}

impl ZobristTable {
    /// Builds the table from `seed` when given, otherwise from entropy.
    pub fn new(seed: Option<u32>) -> Self {
        let mut rng = match seed {
            Some(seed) => SeededRng::from_state(seed),
            None => SeededRng::from_entropy(),
        };
        ZobristTable {
            keys: std::array::from_fn(|_| rng.next_u32()),
        }
    }

    #[inline]
    pub fn piece_key(&self, board: usize, cell: usize, player: Player) -> u32 {
        self.keys[(board * 9 + cell) * 2 + player.index()]
    }

    #[inline]
    pub fn constraint_key(&self, next_board: Option<u8>) -> u32 {
        let slot = next_board.filter(|&b| b < 9).map_or(0, |b| b as usize + 1);
        self.keys[PIECE_KEYS + slot]
    }

    /// Full hash of board contents plus forced-board indicator.
    pub fn hash(&self, state: &GameState) -> u32 {
        let mut h = 0u32;
        for (b, small) in state.board.iter().enumerate() {
            for (c, cell) in small.iter().enumerate() {
                if let Some(p) = cell {
                    h ^= self.piece_key(b, c, *p);
                }
            }
        }
        h ^ self.constraint_key(state.next_board)
    }

    /// Incrementally updates `hash` for a piece placed on (or removed from) a cell.
    #[inline]
    pub fn toggle_piece(&self, hash: u32, board: usize, cell: usize, player: Player) -> u32 {
        hash ^ self.piece_key(board, cell, player)
    }

    /// Incrementally swaps the forced-board indicator.
    #[inline]
    pub fn swap_constraint(&self, hash: u32, from: Option<u8>, to: Option<u8>) -> u32 {
        hash ^ self.constraint_key(from) ^ self.constraint_key(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{apply_move, Move, RulesError};

    #[test]
    fn test_fnv1a_reference() {
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
    }

    #[test]
    fn test_state_id_equal_states() -> Result<(), RulesError> {
        let a = apply_move(&GameState::new(), Move::new(4, 4))?;
        let b = apply_move(&GameState::new(), Move::new(4, 4))?;
        let c = apply_move(&GameState::new(), Move::new(4, 3))?;
        assert_eq!(state_id(&a), state_id(&b));
        assert_ne!(state_id(&a), state_id(&c));
        assert!(state_id(&a).chars().all(|ch| ch.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn test_serialize_round_trip_through_json() -> Result<(), Box<dyn std::error::Error>> {
        let state = apply_move(&GameState::new(), Move::new(2, 7))?;
        let json = serde_json::to_string(&serialize_state(&state))?;
        let back: SerializedState = serde_json::from_str(&json)?;
        assert_eq!(back.version, SERIALIZED_STATE_VERSION);
        assert_eq!(deserialize_state(&back), state);
        Ok(())
    }

    #[test]
    fn test_zobrist_seeded_is_reproducible() -> Result<(), RulesError> {
        let state = apply_move(&GameState::new(), Move::new(0, 8))?;
        let a = ZobristTable::new(Some(99));
        let b = ZobristTable::new(Some(99));
        assert_eq!(a.hash(&state), b.hash(&state));
        Ok(())
    }

    #[test]
    fn test_zobrist_distinguishes_constraint() {
        let table = ZobristTable::new(Some(1));
        let free = GameState::new();
        let mut forced = GameState::new();
        forced.next_board = Some(0);
        assert_ne!(table.hash(&free), table.hash(&forced));
    }

    #[test]
    fn test_out_of_range_constraint_reads_as_free() {
        let table = ZobristTable::new(Some(1));
        let mut bad = GameState::new();
        bad.next_board = Some(9);
        assert_eq!(table.hash(&bad), table.hash(&GameState::new()));

        let restored = deserialize_state(&serialize_state(&bad));
        assert_eq!(restored.next_board, None);
    }

    #[test]
    fn test_zobrist_incremental_matches_full() -> Result<(), RulesError> {
        let table = ZobristTable::new(Some(5));
        let before = GameState::new();
        let after = apply_move(&before, Move::new(3, 6))?;

        let h = table.toggle_piece(table.hash(&before), 3, 6, Player::X);
        let h = table.swap_constraint(h, before.next_board, after.next_board);
        assert_eq!(h, table.hash(&after));
        Ok(())
    }
}
