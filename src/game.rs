//! Ultimate Tic-Tac-Toe rules: board representation, legal-move enumeration,
//! move application and win/draw detection.
//!
//! Every function here is pure. A [`GameState`] is a value: [`apply_move`]
//! returns a new state and never mutates its input, which is what the search
//! relies on when it replays moves from the root.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All 3-in-a-row lines of a 3x3 grid (rows, columns, diagonals).
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// One of the two players. `X` always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    X,
    O,
}

impl Player {
    /// Returns the other player.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Player::X => 0,
            Player::O => 1,
        }
    }
}

/// A cell is either empty or owned by a player.
pub type Cell = Option<Player>;

/// The nine cells of one sub-board.
pub type SmallBoard = [Cell; 9];

/// A move: which sub-board, and which cell inside it. Both are in `0..9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub board: u8,
    pub cell: u8,
}

impl Move {
    #[inline]
    pub const fn new(board: u8, cell: u8) -> Self {
        Move { board, cell }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.board, self.cell)
    }
}

/// Overall game status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    Ongoing,
    Won(Player),
    Draw,
}

impl GameResult {
    #[inline]
    pub fn is_over(self) -> bool {
        self != GameResult::Ongoing
    }
}

/// Status of a single sub-board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmallBoardStatus {
    Open,
    Won(Player),
    Draw,
}

impl SmallBoardStatus {
    /// A closed board (won or drawn) accepts no more moves.
    #[inline]
    pub fn is_closed(self) -> bool {
        self != SmallBoardStatus::Open
    }
}

/// A two-in-a-row: two owned cells and the empty cell that would complete the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threat {
    pub cells: [u8; 2],
    pub target: u8,
}

/// Errors raised when a move cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("game already finished")]
    GameFinished,

    #[error("move out of bounds: board {board}, cell {cell}")]
    OutOfBounds { board: u8, cell: u8 },

    #[error("cell {cell} of board {board} is already occupied")]
    CellOccupied { board: u8, cell: u8 },

    #[error("board {0} is already closed")]
    BoardClosed(u8),

    #[error("move must be played in board {forced}, got board {board}")]
    ForcedBoardMismatch { forced: u8, board: u8 },
}

/// Complete state of an Ultimate Tic-Tac-Toe game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameState {
    /// `board[b][c]` is cell `c` of sub-board `b`.
    pub board: [SmallBoard; 9],
    pub current_player: Player,
    /// Sub-board the next move is forced into; `None` means free choice.
    pub next_board: Option<u8>,
    pub result: GameResult,
}

impl Default for GameState {
    fn default() -> Self {
        GameState::new()
    }
}

impl GameState {
    /// Empty board, X to move, no constraint.
    pub fn new() -> Self {
        GameState {
            board: [[None; 9]; 9],
            current_player: Player::X,
            next_board: None,
            result: GameResult::Ongoing,
        }
    }

    #[inline]
    pub fn is_over(&self) -> bool {
        self.result.is_over()
    }

    /// The forced sub-board, if in range. Out-of-range values mean free choice.
    #[inline]
    pub fn forced_board(&self) -> Option<usize> {
        self.next_board.map(usize::from).filter(|&b| b < 9)
    }

    #[inline]
    pub fn small_board_status(&self, board: usize) -> SmallBoardStatus {
        evaluate_small_board(&self.board[board])
    }

    /// Number of occupied cells on the whole board.
    pub fn occupied(&self) -> usize {
        self.board
            .iter()
            .map(|small| small.iter().filter(|c| c.is_some()).count())
            .sum()
    }
}

/// Evaluates one sub-board: a line of three wins, a full board without a line is a draw.
pub fn evaluate_small_board(cells: &SmallBoard) -> SmallBoardStatus {
    for [a, b, c] in LINES {
        if let Some(p) = cells[a] {
            if cells[b] == Some(p) && cells[c] == Some(p) {
                return SmallBoardStatus::Won(p);
            }
        }
    }
    if cells.iter().all(Option::is_some) {
        SmallBoardStatus::Draw
    } else {
        SmallBoardStatus::Open
    }
}

/// Overall result computed from the sub-board statuses.
fn evaluate_big_board(statuses: &[SmallBoardStatus; 9]) -> GameResult {
    let owner = |i: usize| match statuses[i] {
        SmallBoardStatus::Won(p) => Some(p),
        _ => None,
    };
    for [a, b, c] in LINES {
        if let Some(p) = owner(a) {
            if owner(b) == Some(p) && owner(c) == Some(p) {
                return GameResult::Won(p);
            }
        }
    }
    if statuses.iter().all(|s| s.is_closed()) {
        GameResult::Draw
    } else {
        GameResult::Ongoing
    }
}

/// Returns the sub-boards the side to move may play in.
fn allowed_boards(state: &GameState) -> Vec<usize> {
    if let Some(forced) = state.forced_board() {
        if !state.small_board_status(forced).is_closed() {
            return vec![forced];
        }
    }
    (0..9)
        .filter(|&b| !state.small_board_status(b).is_closed())
        .collect()
}

/// Returns every legal move for the side to move. Empty iff the game is over.
///
/// # Examples
/// ```rust
/// use uttt_mcts::{legal_moves, GameState};
/// assert_eq!(legal_moves(&GameState::new()).len(), 81);
/// ```
pub fn legal_moves(state: &GameState) -> Vec<Move> {
    if state.is_over() {
        return Vec::new();
    }
    let mut moves = Vec::with_capacity(81);
    for b in allowed_boards(state) {
        for c in 0..9 {
            if state.board[b][c].is_none() {
                moves.push(Move::new(b as u8, c as u8));
            }
        }
    }
    moves
}

/// Returns `true` if `mv` is legal in `state`.
pub fn is_legal_move(state: &GameState, mv: Move) -> bool {
    legal_moves(state).contains(&mv)
}

/// Applies `mv` for the side to move and returns the resulting state.
///
/// # Errors
/// Any [`RulesError`] if the move is not legal in `state`.
pub fn apply_move(state: &GameState, mv: Move) -> Result<GameState, RulesError> {
    if state.is_over() {
        return Err(RulesError::GameFinished);
    }
    if mv.board > 8 || mv.cell > 8 {
        return Err(RulesError::OutOfBounds {
            board: mv.board,
            cell: mv.cell,
        });
    }
    let (b, c) = (mv.board as usize, mv.cell as usize);
    if state.board[b][c].is_some() {
        return Err(RulesError::CellOccupied {
            board: mv.board,
            cell: mv.cell,
        });
    }
    if state.small_board_status(b).is_closed() {
        return Err(RulesError::BoardClosed(mv.board));
    }
    if let Some(forced) = state.forced_board() {
        if forced != b && !state.small_board_status(forced).is_closed() {
            return Err(RulesError::ForcedBoardMismatch {
                forced: forced as u8,
                board: mv.board,
            });
        }
    }

    let mut next = state.clone();
    next.board[b][c] = Some(state.current_player);

    let statuses: [SmallBoardStatus; 9] =
        std::array::from_fn(|i| evaluate_small_board(&next.board[i]));

    next.result = evaluate_big_board(&statuses);
    next.next_board = if statuses[c].is_closed() {
        None
    } else {
        Some(mv.cell)
    };
    next.current_player = state.current_player.opponent();
    Ok(next)
}

/// Finds every two-in-a-row of `player` on a sub-board whose third cell is empty.
pub fn find_two_in_row(cells: &SmallBoard, player: Player) -> Vec<Threat> {
    let mut out = Vec::new();
    for [a, b, c] in LINES {
        for (x, y, target) in [(a, b, c), (a, c, b), (b, c, a)] {
            if cells[x] == Some(player) && cells[y] == Some(player) && cells[target].is_none() {
                out.push(Threat {
                    cells: [x as u8, y as u8],
                    target: target as u8,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{drawn_board, state_with_drawn_board_4};

    fn play_all(moves: &[(u8, u8)]) -> Result<GameState, RulesError> {
        let mut state = GameState::new();
        for &(b, c) in moves {
            state = apply_move(&state, Move::new(b, c))?;
        }
        Ok(state)
    }

    #[test]
    fn test_new_game() {
        let state = GameState::new();
        assert_eq!(state.current_player, Player::X);
        assert_eq!(state.next_board, None);
        assert_eq!(state.result, GameResult::Ongoing);
        assert_eq!(legal_moves(&state).len(), 81);
    }

    #[test]
    fn test_forced_board() -> Result<(), RulesError> {
        let state = play_all(&[(0, 4)])?;
        assert_eq!(state.next_board, Some(4));
        assert_eq!(state.current_player, Player::O);

        let moves = legal_moves(&state);
        assert_eq!(moves.len(), 9);
        assert!(moves.iter().all(|m| m.board == 4));
        Ok(())
    }

    #[test]
    fn test_apply_move_errors() -> Result<(), RulesError> {
        let state = play_all(&[(0, 4)])?;

        assert_eq!(
            apply_move(&state, Move::new(1, 0)),
            Err(RulesError::ForcedBoardMismatch { forced: 4, board: 1 })
        );
        assert_eq!(
            apply_move(&state, Move::new(9, 0)),
            Err(RulesError::OutOfBounds { board: 9, cell: 0 })
        );

        let state = play_all(&[(4, 4)])?;
        assert_eq!(
            apply_move(&state, Move::new(4, 4)),
            Err(RulesError::CellOccupied { board: 4, cell: 4 })
        );
        Ok(())
    }

    #[test]
    fn test_apply_move_is_pure() -> Result<(), RulesError> {
        let state = GameState::new();
        let before = state.clone();
        let _ = apply_move(&state, Move::new(3, 3))?;
        assert_eq!(state, before);
        Ok(())
    }

    #[test]
    fn test_evaluate_small_board() {
        let mut cells: SmallBoard = [None; 9];
        assert_eq!(evaluate_small_board(&cells), SmallBoardStatus::Open);

        cells[2] = Some(Player::O);
        cells[4] = Some(Player::O);
        cells[6] = Some(Player::O);
        assert_eq!(evaluate_small_board(&cells), SmallBoardStatus::Won(Player::O));

        assert_eq!(evaluate_small_board(&drawn_board()), SmallBoardStatus::Draw);
    }

    #[test]
    fn test_closed_forced_board_gives_free_choice() {
        let state = state_with_drawn_board_4();
        assert_eq!(state.next_board, Some(4));

        let moves = legal_moves(&state);
        assert!(!moves.is_empty());
        assert!(moves.iter().all(|m| m.board != 4));
        assert_eq!(moves.len(), 72);
    }

    #[test]
    fn test_small_and_big_win() -> Result<(), RulesError> {
        // X takes board 0 with cells 0,1,2 while O answers in boards 1 and 2.
        let state = play_all(&[(0, 0), (0, 1), (1, 0), (0, 2), (2, 0), (0, 3)])?;
        assert_eq!(state.small_board_status(0), SmallBoardStatus::Open);

        let mut state = GameState::new();
        for b in [0usize, 1, 2] {
            state.board[b][0] = Some(Player::X);
            state.board[b][1] = Some(Player::X);
        }
        state.board[3][0] = Some(Player::O);
        state.board[3][1] = Some(Player::O);
        state.board[0][2] = Some(Player::X);
        state.board[1][2] = Some(Player::X);
        state.next_board = Some(2);

        let next = apply_move(&state, Move::new(2, 2))?;
        assert_eq!(next.result, GameResult::Won(Player::X));
        assert!(legal_moves(&next).is_empty());
        assert_eq!(
            apply_move(&next, Move::new(5, 5)),
            Err(RulesError::GameFinished)
        );
        Ok(())
    }

    #[test]
    fn test_board_closed_error() {
        let mut state = GameState::new();
        state.board[0][0] = Some(Player::X);
        state.board[0][1] = Some(Player::X);
        state.board[0][2] = Some(Player::X);
        assert_eq!(
            apply_move(&state, Move::new(0, 5)),
            Err(RulesError::BoardClosed(0))
        );
    }

    #[test]
    fn test_next_board_is_free_when_target_closed() -> Result<(), RulesError> {
        let mut state = GameState::new();
        state.board[5] = drawn_board();
        let next = apply_move(&state, Move::new(0, 5))?;
        assert_eq!(next.next_board, None);
        Ok(())
    }

    #[test]
    fn test_out_of_range_forced_board_is_free_choice() -> Result<(), RulesError> {
        let mut state = GameState::new();
        state.next_board = Some(9);
        assert_eq!(state.forced_board(), None);
        assert_eq!(legal_moves(&state).len(), 81);

        let next = apply_move(&state, Move::new(7, 3))?;
        assert_eq!(next.next_board, Some(3));
        Ok(())
    }

    #[test]
    fn test_find_two_in_row() {
        let mut cells: SmallBoard = [None; 9];
        cells[0] = Some(Player::X);
        cells[4] = Some(Player::X);
        let threats = find_two_in_row(&cells, Player::X);
        assert_eq!(threats, vec![Threat { cells: [0, 4], target: 8 }]);
        assert!(find_two_in_row(&cells, Player::O).is_empty());

        cells[8] = Some(Player::O);
        assert!(find_two_in_row(&cells, Player::X).is_empty());
    }
}
