//! Background search workers.
//!
//! A [`WorkerPool`] owns a set of worker threads, each draining its own
//! request queue. Callers block in [`WorkerPool::run`] until the matching
//! response arrives, their signal fires or their timeout elapses. Every
//! request is resolved exactly once: whichever side removes the request from
//! the pending map first decides the outcome, and the other side becomes a
//! no-op.
//!
//! Idle workers are pruned lazily at the start of each run (and on demand
//! through [`WorkerPool::prune_idle`]).

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    dispatch::CancelToken,
    protocol::{serve, Request, RequestId, Response, RunRequest},
    serialize_state,
    utils::unix_millis,
    GameState, SearchParams, SerializedState,
};

/// Environment variable that forces inline execution when set to `1`.
pub const FORCE_DIRECT_ENV: &str = "UTTT_FORCE_DIRECT";

/// Pool size when the available parallelism is unknown.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// Granularity at which a waiting caller re-checks its signal and timeout.
const WAIT_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("request aborted")]
    Aborted,

    #[error("request timed out")]
    Timeout,

    #[error("failed to post request: {0}")]
    Transport(String),

    #[error("worker exited before answering")]
    WorkerCrashed,

    #[error("pool terminated")]
    Terminated,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Fixed worker count; `None` sizes from the available parallelism.
    pub size: Option<usize>,
    /// Workers unused for this long are pruned.
    pub idle_timeout: Duration,
    /// Pruning never goes below this many workers.
    pub min_workers: usize,
    /// Refuse to build a pool so callers run inline.
    pub force_direct: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            size: None,
            idle_timeout: Duration::from_secs(30),
            min_workers: 1,
            force_direct: false,
        }
    }
}

impl PoolConfig {
    /// Default config, with `force_direct` taken from [`FORCE_DIRECT_ENV`].
    pub fn from_env() -> Self {
        PoolConfig {
            force_direct: std::env::var(FORCE_DIRECT_ENV).is_ok_and(|v| v == "1"),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn with_min_workers(mut self, min: usize) -> Self {
        self.min_workers = min;
        self
    }

    pub fn with_force_direct(mut self, force: bool) -> Self {
        self.force_direct = force;
        self
    }
}

/// Available parallelism minus one, at least one; [`DEFAULT_POOL_SIZE`] if unknown.
pub fn default_pool_size() -> usize {
    match thread::available_parallelism() {
        Ok(n) if n.get() > 1 => n.get() - 1,
        Ok(_) => 1,
        Err(_) => DEFAULT_POOL_SIZE,
    }
}

/// A search to run on a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub state: SerializedState,
    pub params: SearchParams,
}

impl Job {
    pub fn new(state: &GameState, params: SearchParams) -> Self {
        Job {
            state: serialize_state(state),
            params,
        }
    }
}

/// Per-call cancellation triggers.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub signal: Option<CancelToken>,
    pub timeout: Option<Duration>,
}

/// Observability counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub workers: usize,
    pub tasks_run: u64,
    pub tasks_failed: u64,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub last_task_at: u64,
}

struct Pending {
    reply: mpsc::Sender<Response>,
    worker: usize,
}

/// State shared by the pool handle and its workers.
#[derive(Default)]
struct Shared {
    pending: Mutex<FxHashMap<RequestId, Pending>>,
    tokens: Mutex<FxHashMap<RequestId, CancelToken>>,
    terminated: AtomicBool,
    tasks_run: AtomicU64,
    tasks_failed: AtomicU64,
    last_task_at: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn token(&self, id: RequestId) -> Option<CancelToken> {
        lock(&self.tokens).get(&id).cloned()
    }

    fn cancel(&self, id: RequestId) {
        if let Some(token) = lock(&self.tokens).get(&id) {
            token.cancel();
        }
    }

    /// Removes `id` from the pending map; true if the caller now owns its resolution.
    fn take_pending(&self, id: RequestId) -> Option<Pending> {
        lock(&self.pending).remove(&id)
    }

    fn deliver(&self, response: Response) {
        let id = response.id();
        lock(&self.tokens).remove(&id);
        if let Some(pending) = self.take_pending(id) {
            let _ = pending.reply.send(response);
        }
    }

    fn has_pending(&self) -> bool {
        !lock(&self.pending).is_empty()
    }
}

/// Drops every pending reply of a worker when its thread exits, so waiting
/// callers see a disconnect instead of hanging.
struct ExitGuard {
    worker: usize,
    shared: Arc<Shared>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut pending = lock(&self.shared.pending);
        let before = pending.len();
        pending.retain(|_, p| p.worker != self.worker);
        let orphaned = before - pending.len();
        if orphaned > 0 {
            warn!(worker = self.worker, orphaned, "worker exited with requests in flight");
        }
    }
}

fn worker_loop(worker: usize, rx: mpsc::Receiver<Request>, shared: Arc<Shared>) {
    let _exit = ExitGuard {
        worker,
        shared: Arc::clone(&shared),
    };
    debug!(worker, "worker started");

    while let Ok(request) = rx.recv() {
        match request {
            Request::Cancel { id } => shared.cancel(id),
            Request::Run(run) => {
                let id = run.id;
                // No token means the caller already gave up on this request.
                let Some(token) = shared.token(id) else {
                    debug!(worker, id, "skipping resolved request");
                    continue;
                };
                let response = panic::catch_unwind(AssertUnwindSafe(|| serve(run, &token)))
                    .unwrap_or_else(|_| {
                        warn!(worker, id, "search panicked");
                        Response::Error {
                            id,
                            error: "search panicked".into(),
                        }
                    });
                shared.deliver(response);
            }
        }
    }
    debug!(worker, "worker stopped");
}

struct WorkerHandle {
    id: usize,
    tx: mpsc::Sender<Request>,
    busy: Arc<AtomicUsize>,
    last_used: Instant,
}

/// Decrements a worker's load when the caller stops waiting, on every path.
struct BusyGuard(Arc<AtomicUsize>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| Some(b.saturating_sub(1)));
    }
}

/// A pool of background search workers.
///
/// # Examples
/// ```rust
/// use uttt_mcts::{GameState, Job, PoolConfig, Response, RunOptions, SearchParams, WorkerPool};
///
/// let pool = WorkerPool::new(PoolConfig::default().with_size(1)).expect("threads available");
/// let job = Job::new(&GameState::new(), SearchParams::DEFAULT.with_iterations(50));
/// let response = pool.run(job, RunOptions::default()).expect("worker answered");
/// assert!(matches!(response, Response::Result { .. }));
/// ```
pub struct WorkerPool {
    config: PoolConfig,
    workers: Mutex<Vec<WorkerHandle>>,
    shared: Arc<Shared>,
    next_request: AtomicU64,
    next_worker: AtomicUsize,
    created_at: u64,
}

impl WorkerPool {
    /// Starts the workers.
    ///
    /// # Returns
    /// `None` when direct execution is forced (by config or by
    /// [`FORCE_DIRECT_ENV`]) or no worker thread could be started; the caller
    /// must then search inline.
    pub fn new(config: PoolConfig) -> Option<WorkerPool> {
        let forced_by_env = std::env::var(FORCE_DIRECT_ENV).is_ok_and(|v| v == "1");
        if config.force_direct || forced_by_env {
            debug!("direct execution forced, no worker pool");
            return None;
        }

        let size = config.size.unwrap_or_else(default_pool_size).max(1);
        let pool = WorkerPool {
            config,
            workers: Mutex::new(Vec::with_capacity(size)),
            shared: Arc::new(Shared::default()),
            next_request: AtomicU64::new(1),
            next_worker: AtomicUsize::new(0),
            created_at: unix_millis(),
        };

        {
            let mut workers = lock(&pool.workers);
            for _ in 0..size {
                if let Some(w) = pool.spawn_worker() {
                    workers.push(w);
                }
            }
            if workers.is_empty() {
                warn!("no worker thread could be started");
                return None;
            }
            info!(workers = workers.len(), "worker pool started");
        }
        Some(pool)
    }

    fn spawn_worker(&self) -> Option<WorkerHandle> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("uttt-worker-{id}"))
            .spawn(move || worker_loop(id, rx, shared));

        match spawned {
            Ok(_) => Some(WorkerHandle {
                id,
                tx,
                busy: Arc::new(AtomicUsize::new(0)),
                last_used: Instant::now(),
            }),
            Err(e) => {
                warn!(error = %e, "failed to spawn worker");
                None
            }
        }
    }

    /// Least busy worker (first on ties), spawning one if none is alive.
    fn pick_worker(&self) -> Result<(usize, mpsc::Sender<Request>, Arc<AtomicUsize>), PoolError> {
        let mut workers = lock(&self.workers);
        if workers.is_empty() {
            let w = self
                .spawn_worker()
                .ok_or_else(|| PoolError::Transport("cannot start worker".into()))?;
            workers.push(w);
        }

        let mut best = 0;
        for (i, w) in workers.iter().enumerate() {
            if w.busy.load(Ordering::Acquire) < workers[best].busy.load(Ordering::Acquire) {
                best = i;
            }
        }
        let w = &mut workers[best];
        w.busy.fetch_add(1, Ordering::AcqRel);
        w.last_used = Instant::now();
        Ok((w.id, w.tx.clone(), Arc::clone(&w.busy)))
    }

    fn post_cancel(&self, tx: &mpsc::Sender<Request>, id: RequestId) {
        self.shared.cancel(id);
        let _ = tx.send(Request::Cancel { id });
    }

    fn fail(&self, id: RequestId, error: PoolError) -> Result<Response, PoolError> {
        lock(&self.shared.tokens).remove(&id);
        self.shared.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.shared.last_task_at.store(unix_millis(), Ordering::Relaxed);
        debug!(id, %error, "request failed");
        Err(error)
    }

    /// Runs `job` on the least busy worker and waits for its response.
    ///
    /// The signal firing, the timeout elapsing and a failed post each send a
    /// best-effort cancel to the worker and return immediately.
    pub fn run(&self, job: Job, options: RunOptions) -> Result<Response, PoolError> {
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(PoolError::Terminated);
        }
        self.prune_idle();

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (worker, tx, busy) = self.pick_worker()?;
        let _busy = BusyGuard(busy);
        let (reply_tx, reply_rx) = mpsc::channel();

        lock(&self.shared.tokens).insert(id, CancelToken::new());
        lock(&self.shared.pending).insert(
            id,
            Pending {
                reply: reply_tx,
                worker,
            },
        );

        if options.signal.as_ref().is_some_and(CancelToken::is_cancelled) {
            self.shared.take_pending(id);
            return self.fail(id, PoolError::Aborted);
        }

        let request = Request::Run(RunRequest {
            id,
            state: job.state,
            params: job.params,
            seed: None,
        });
        if let Err(e) = tx.send(request) {
            self.shared.take_pending(id);
            return self.fail(id, PoolError::Transport(e.to_string()));
        }

        let deadline = options.timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            match reply_rx.recv_timeout(WAIT_SLICE) {
                Ok(response) => {
                    let counter = match response {
                        Response::Result { .. } => &self.shared.tasks_run,
                        Response::Aborted { .. } | Response::Error { .. } => &self.shared.tasks_failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    self.shared.last_task_at.store(unix_millis(), Ordering::Relaxed);
                    return Ok(response);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let error = if self.shared.terminated.load(Ordering::Acquire) {
                        PoolError::Terminated
                    } else {
                        PoolError::WorkerCrashed
                    };
                    return self.fail(id, error);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let error = if options.signal.as_ref().is_some_and(CancelToken::is_cancelled) {
                        PoolError::Aborted
                    } else if deadline.is_some_and(|d| Instant::now() >= d) {
                        PoolError::Timeout
                    } else {
                        continue;
                    };
                    // Losing this race means the response is already queued.
                    if self.shared.take_pending(id).is_some() {
                        self.post_cancel(&tx, id);
                        return self.fail(id, error);
                    }
                }
            }
        }
    }

    /// Stops workers idle for longer than the idle window.
    ///
    /// Keeps at least `min_workers`, and at least one while any request is
    /// outstanding.
    pub fn prune_idle(&self) {
        let floor = if self.shared.has_pending() {
            self.config.min_workers.max(1)
        } else {
            self.config.min_workers
        };
        let now = Instant::now();
        let mut workers = lock(&self.workers);
        let mut i = workers.len();
        while i > 0 {
            i -= 1;
            if workers.len() <= floor {
                break;
            }
            let w = &workers[i];
            if w.busy.load(Ordering::Acquire) == 0
                && now.duration_since(w.last_used) > self.config.idle_timeout
            {
                debug!(worker = w.id, "pruning idle worker");
                // Dropping the sender ends the worker's receive loop.
                workers.remove(i);
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: lock(&self.workers).len(),
            tasks_run: self.shared.tasks_run.load(Ordering::Relaxed),
            tasks_failed: self.shared.tasks_failed.load(Ordering::Relaxed),
            created_at: self.created_at,
            last_task_at: self.shared.last_task_at.load(Ordering::Relaxed),
        }
    }

    /// Stops every worker and rejects all pending requests with
    /// [`PoolError::Terminated`].
    pub fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        for token in lock(&self.shared.tokens).values() {
            token.cancel();
        }
        lock(&self.workers).clear();
        let rejected = {
            let mut pending = lock(&self.shared.pending);
            let n = pending.len();
            pending.clear();
            n
        };
        info!(rejected, "worker pool terminated");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}
