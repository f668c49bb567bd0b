//! Deadline and cancellation harness around one unit of search work.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{trace, warn};

use crate::SearchParams;

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

/// Cooperative cancellation flag, cheap to clone and share across threads.
///
/// A token created with [`child_of`](Self::child_of) also reports cancelled
/// once any ancestor is cancelled; cancelling the child never affects the
/// parent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child_of(parent: &CancelToken) -> Self {
        CancelToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(parent.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.parent.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Limits applied by [`run_with_budget`].
#[derive(Debug, Clone, Default)]
pub struct Budget {
    pub time_ms: Option<u64>,
    pub iterations: Option<u32>,
    /// External token whose cancellation also cancels the work.
    pub cancel: Option<CancelToken>,
}

impl Budget {
    pub fn from_params(params: &SearchParams, cancel: Option<CancelToken>) -> Self {
        Budget {
            time_ms: params.time_budget_ms,
            iterations: Some(params.iteration_budget),
            cancel,
        }
    }

    fn is_bounded(&self) -> bool {
        self.time_ms.is_some_and(|t| t > 0) || self.iterations.is_some_and(|n| n > 0)
    }
}

/// Timer thread that cancels a token unless dropped first.
struct TimerGuard {
    disarm: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TimerGuard {
    fn arm(token: CancelToken, after: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("uttt-budget-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(after) {
                    trace!(?after, "time budget elapsed, cancelling");
                    token.cancel();
                }
            });

        match spawned {
            Ok(handle) => TimerGuard {
                disarm: Some(tx),
                handle: Some(handle),
            },
            Err(e) => {
                warn!(error = %e, "failed to spawn budget timer, relying on the search deadline");
                TimerGuard {
                    disarm: None,
                    handle: None,
                }
            }
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the timer thread immediately.
        drop(self.disarm.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Runs `work` inside a deadline/cancellation context.
///
/// Without any time or iteration budget, `work` runs to completion with a
/// token that is never cancelled. Otherwise a fresh token is handed to
/// `work`; it is cancelled when `budget.time_ms` elapses or when
/// `budget.cancel` is cancelled. The timer is torn down on every exit path,
/// including unwinding.
///
/// # Examples
/// ```rust
/// use uttt_mcts::{run_with_budget, Budget};
///
/// let budget = Budget { time_ms: Some(5), ..Default::default() };
/// let cancelled = run_with_budget(|token| {
///     while !token.is_cancelled() {
///         std::thread::yield_now();
///     }
///     true
/// }, &budget);
/// assert!(cancelled);
/// ```
pub fn run_with_budget<T>(work: impl FnOnce(&CancelToken) -> T, budget: &Budget) -> T {
    if !budget.is_bounded() {
        return work(&CancelToken::new());
    }

    let token = match &budget.cancel {
        Some(external) => CancelToken::child_of(external),
        None => CancelToken::new(),
    };
    let _timer = budget
        .time_ms
        .filter(|&ms| ms > 0)
        .map(|ms| TimerGuard::arm(token.clone(), Duration::from_millis(ms)));

    work(&token)
}
