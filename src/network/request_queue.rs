//! Request Queue Module
//!
//! FIFO dispatcher with bounded concurrency and optional start-rate limiting.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};

/// How a pending job leaves the queue.
enum Dispatch {
    Run,
    Reject,
}

/// Type-erased pending entry. `Run` yields the future to drive; `Reject`
/// fails the entry's result in place.
type Job = Box<dyn FnOnce(Dispatch) -> Option<BoxFuture<'static, ()>> + Send>;

struct QueueState {
    pending: VecDeque<Job>,
    active: usize,
    last_start: Option<Instant>,
    disposed: bool,
    /// A drain loop task is currently running
    draining: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    max_concurrent: usize,
    rate_limit_delay: Option<Duration>,
}

enum Step {
    Start(Job),
    WaitUntil(Instant),
    Stop,
}

// == Request Queue ==
/// Runs submitted actions in FIFO order, at most `max_concurrent` at a time.
///
/// With a rate limit, consecutive starts across the whole queue are spaced
/// at least `rate_limit_delay` apart. Cloning yields another handle to the
/// same queue. Submitting requires a running Tokio runtime.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("max_concurrent", &self.shared.max_concurrent)
            .field("rate_limit_delay", &self.shared.rate_limit_delay)
            .field("active", &self.active_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl RequestQueue {
    // == Constructor ==
    /// Creates a queue. Zero concurrency is rejected.
    pub fn new(config: &QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: 0,
                    last_start: None,
                    disposed: false,
                    draining: false,
                }),
                max_concurrent: config.max_concurrent,
                rate_limit_delay: config.rate_limit_delay,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    // == Add ==
    /// Enqueues `action` and returns a future resolving to its outcome.
    ///
    /// The entry is queued when `add` is called, not when the returned
    /// future is first polled. After [`RequestQueue::dispose`] the future
    /// resolves to `QueueError::Disposed` without running `action`.
    pub fn add<F, Fut, T, E>(&self, action: F) -> impl Future<Output = std::result::Result<T, QueueError<E>>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |dispatch| match dispatch {
            Dispatch::Run => Some(
                async move {
                    let outcome = action().await.map_err(QueueError::Failed);
                    let _ = tx.send(outcome);
                }
                .boxed(),
            ),
            Dispatch::Reject => {
                let _ = tx.send(Err(QueueError::Disposed));
                None
            }
        });

        let rejected = {
            let mut state = self.lock();
            if state.disposed {
                Some(job)
            } else {
                state.pending.push_back(job);
                None
            }
        };

        match rejected {
            Some(job) => {
                warn!("Action submitted to a disposed request queue");
                job(Dispatch::Reject);
            }
            None => self.drain(),
        }

        async move { rx.await.unwrap_or(Err(QueueError::Dropped)) }
    }

    /// Starts a drain loop unless one is already running.
    fn drain(&self) {
        {
            let mut state = self.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let queue = self.clone();
        tokio::spawn(async move { queue.drain_loop().await });
    }

    async fn drain_loop(&self) {
        loop {
            match self.next_step() {
                Step::Stop => return,
                Step::WaitUntil(ready_at) => tokio::time::sleep_until(ready_at).await,
                Step::Start(job) => {
                    if let Some(task) = job(Dispatch::Run) {
                        let queue = self.clone();
                        tokio::spawn(async move {
                            // A panicking action drops its sender; the caller sees `Dropped`
                            let _ = AssertUnwindSafe(task).catch_unwind().await;
                            queue.finish();
                        });
                    }
                }
            }
        }
    }

    fn next_step(&self) -> Step {
        let mut state = self.lock();
        if state.disposed || state.pending.is_empty() || state.active >= self.shared.max_concurrent {
            state.draining = false;
            return Step::Stop;
        }

        if let (Some(delay), Some(last)) = (self.shared.rate_limit_delay, state.last_start) {
            let ready_at = last + delay;
            if ready_at > Instant::now() {
                return Step::WaitUntil(ready_at);
            }
        }

        match state.pending.pop_front() {
            Some(job) => {
                state.active += 1;
                state.last_start = Some(Instant::now());
                debug!(active = state.active, pending = state.pending.len(), "Dispatching queued action");
                Step::Start(job)
            }
            None => {
                state.draining = false;
                Step::Stop
            }
        }
    }

    fn finish(&self) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.drain();
    }

    // == Dispose ==
    /// Stops the queue and fails every not-yet-started entry with
    /// `QueueError::Disposed`. Running actions are left to finish.
    pub fn dispose(&self) {
        let pending: Vec<Job> = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.pending.drain(..).collect()
        };

        info!(rejected = pending.len(), "Request queue disposed");
        for job in pending {
            job(Dispatch::Reject);
        }
    }
}
