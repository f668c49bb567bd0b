//! Messages exchanged between a caller and a background search worker.
//!
//! ```json
//! {"type": "run", "id": 7, "state": {...}, "params": {...}, "seed": "s1"}
//! {"type": "cancel", "id": 7}
//! {"type": "result", "id": 7, "move": {"board": 4, "cell": 4}, "stats": {...}}
//! {"type": "aborted", "id": 7}
//! {"type": "error", "id": 7, "error": "no legal moves available"}
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    deserialize_state,
    diagnostics::{Diagnostics, SearchStats},
    dispatch::{run_with_budget, Budget, CancelToken},
    mcts::{search, SearchStatus},
    Move, SearchParams, Seed, SerializedState, SERIALIZED_STATE_VERSION,
};

/// Per-pool unique request identifier.
pub type RequestId = u64;

/// Search job addressed to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub id: RequestId,
    pub state: SerializedState,
    #[serde(default)]
    pub params: SearchParams,
    /// Overrides `params.seed` when present.
    #[serde(default)]
    pub seed: Option<Seed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Run(RunRequest),
    Cancel { id: RequestId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Result {
        id: RequestId,
        #[serde(rename = "move")]
        mv: Move,
        status: SearchStatus,
        stats: SearchStats,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagnostics: Option<Diagnostics>,
    },
    Aborted {
        id: RequestId,
    },
    Error {
        id: RequestId,
        error: String,
    },
}

impl Response {
    pub fn id(&self) -> RequestId {
        match self {
            Response::Result { id, .. } | Response::Aborted { id } | Response::Error { id, .. } => {
                *id
            }
        }
    }
}

/// Worker-side handling of a run request.
///
/// The search runs under [`run_with_budget`] with `cancel` as the external
/// token. A search stopped through `cancel` answers [`Response::Aborted`].
pub fn serve(request: RunRequest, cancel: &CancelToken) -> Response {
    let RunRequest {
        id,
        state,
        mut params,
        seed,
    } = request;

    if state.version != SERIALIZED_STATE_VERSION {
        return Response::Error {
            id,
            error: format!(
                "unsupported state version {} (expected {SERIALIZED_STATE_VERSION})",
                state.version
            ),
        };
    }
    if cancel.is_cancelled() {
        return Response::Aborted { id };
    }
    if seed.is_some() {
        params.seed = seed;
    }

    let state = deserialize_state(&state);
    let budget = Budget::from_params(&params, Some(cancel.clone()));
    let result = run_with_budget(|token| search(&state, params.clone(), token), &budget);

    match result {
        Ok(_) if cancel.is_cancelled() => {
            debug!(id, "run cancelled by caller");
            Response::Aborted { id }
        }
        Ok(outcome) => Response::Result {
            id,
            mv: outcome.mv,
            status: outcome.status,
            stats: outcome.stats,
            diagnostics: outcome.diagnostics,
        },
        Err(e) => Response::Error {
            id,
            error: e.to_string(),
        },
    }
}
