//! Non-searching opponents, used as benchmark baselines.

use tracing::trace;

use crate::{
    heuristic::MoveScorer, legal_moves, mcts::SearchError, utils::pick_random, GameState, Move,
    SeededRng,
};

/// Scores closer than this count as tied.
const TIE_EPSILON: f64 = 1e-9;

/// Uniformly random legal move.
pub fn random_move(state: &GameState, rng: &mut SeededRng) -> Result<Move, SearchError> {
    pick_random(&legal_moves(state), rng).ok_or(SearchError::NoLegalMoves)
}

/// One-ply greedy move: the best `scorer` value, ties broken with `rng`.
///
/// Moves whose score fails are skipped; if every score fails the move is
/// picked uniformly.
pub fn greedy_move(
    state: &GameState,
    scorer: &dyn MoveScorer,
    rng: &mut SeededRng,
) -> Result<Move, SearchError> {
    let moves = legal_moves(state);
    if moves.is_empty() {
        return Err(SearchError::NoLegalMoves);
    }

    let mut best = f64::NEG_INFINITY;
    let mut ties: Vec<Move> = Vec::new();
    for &mv in &moves {
        let Ok(score) = scorer.score(state, mv, rng) else {
            continue;
        };
        if score > best + TIE_EPSILON {
            best = score;
            ties.clear();
            ties.push(mv);
        } else if (score - best).abs() <= TIE_EPSILON {
            ties.push(mv);
        }
    }

    let pool = if ties.is_empty() { &moves } else { &ties };
    trace!(best, ties = ties.len(), "greedy choice");
    pick_random(pool, rng).ok_or(SearchError::NoLegalMoves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        apply_move, heuristic::HeuristicScorer, test_utils::FailingScorer, GameResult, Player,
    };

    #[test]
    fn test_random_move_is_legal() -> Result<(), SearchError> {
        let state = GameState::new();
        let mut rng = SeededRng::from_seed("baseline");
        let legal = legal_moves(&state);
        for _ in 0..20 {
            assert!(legal.contains(&random_move(&state, &mut rng)?));
        }
        Ok(())
    }

    #[test]
    fn test_finished_game_has_no_move() {
        let mut state = GameState::new();
        state.result = GameResult::Won(Player::O);
        let mut rng = SeededRng::from_seed(1u32);
        assert!(matches!(random_move(&state, &mut rng), Err(SearchError::NoLegalMoves)));
        assert!(matches!(
            greedy_move(&state, &HeuristicScorer::new(0.0), &mut rng),
            Err(SearchError::NoLegalMoves)
        ));
    }

    #[test]
    fn test_greedy_takes_local_win() -> Result<(), SearchError> {
        // X holds cells 0 and 1 of board 2 and must play there.
        let mut state = GameState::new();
        state.board[2][0] = Some(Player::X);
        state.board[2][1] = Some(Player::X);
        state.next_board = Some(2);

        let mut rng = SeededRng::from_seed("greedy");
        let mv = greedy_move(&state, &HeuristicScorer::new(0.0), &mut rng)?;
        assert_eq!(mv, Move::new(2, 2));
        let after = apply_move(&state, mv)?;
        assert!(after.small_board_status(2).is_closed());
        Ok(())
    }

    #[test]
    fn test_greedy_ties_use_rng() -> Result<(), SearchError> {
        // Zero randomness keeps symmetric corners tied; the seed decides.
        let state = GameState::new();
        let scorer = HeuristicScorer::new(0.0);
        let a = greedy_move(&state, &scorer, &mut SeededRng::from_seed("t1"))?;
        let b = greedy_move(&state, &scorer, &mut SeededRng::from_seed("t1"))?;
        assert_eq!(a, b);
        assert!(legal_moves(&state).contains(&a));
        Ok(())
    }

    #[test]
    fn test_greedy_with_failing_scorer() -> Result<(), SearchError> {
        let state = GameState::new();
        let mut rng = SeededRng::from_seed("fail");
        let mv = greedy_move(&state, &FailingScorer, &mut rng)?;
        assert!(legal_moves(&state).contains(&mv));
        Ok(())
    }
}
