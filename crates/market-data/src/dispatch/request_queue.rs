//! Priority request queue serializing every upstream call.
//!
//! A single dispatch loop pops the highest-priority, oldest task, passes it
//! through the global [`RateLimiter`] and a minimum inter-request spacing, and
//! runs it under the [`RetryExecutor`]. Exactly one task is in flight at a time:
//! the upstream quota is the binding constraint, so concurrency buys nothing.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::rate_limiter::RateLimiter;
use super::retry::RetryExecutor;
use crate::errors::MarketDataError;

/// Priority for ordinary single-symbol requests.
pub const PRIORITY_NORMAL: i32 = 0;

/// Priority for grouped batch fetches, which serve several callers at once.
pub const PRIORITY_ELEVATED: i32 = 10;

/// Default minimum gap between two dispatches.
const DEFAULT_MIN_SPACING: Duration = Duration::from_secs(2);

/// Default pause after each completed task before the loop looks again.
const DEFAULT_LOOP_DELAY: Duration = Duration::from_millis(100);

/// Queue timing configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum time between two dispatched tasks.
    pub min_spacing: Duration,
    /// Fixed delay before re-arming the loop after a task completes.
    pub loop_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_spacing: DEFAULT_MIN_SPACING,
            loop_delay: DEFAULT_LOOP_DELAY,
        }
    }
}

type Job = Box<dyn FnOnce(RetryExecutor) -> BoxFuture<'static, ()> + Send>;

/// A queued unit of upstream work.
struct QueueTask {
    priority: i32,
    /// Monotonic enqueue sequence, FIFO tiebreak within equal priority.
    seq: u64,
    enqueued_at: Instant,
    job: Job,
}

impl PartialEq for QueueTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueTask {}

impl PartialOrd for QueueTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueTask {
    // BinaryHeap is a max-heap: higher priority wins, then the lower sequence.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueTask>,
    next_seq: u64,
    last_dispatch: Option<Instant>,
    closed: bool,
}

/// Completion handle for an enqueued task.
///
/// Resolves with the task's result once it has been dispatched, or with
/// [`MarketDataError::QueueClosed`] if the queue shuts down first.
#[must_use = "a queue handle does nothing unless awaited"]
pub struct QueueHandle<T> {
    rx: oneshot::Receiver<Result<T, MarketDataError>>,
}

impl<T> Future for QueueHandle<T> {
    type Output = Result<T, MarketDataError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(MarketDataError::QueueClosed)))
    }
}

/// Priority-ordered, FIFO-within-priority queue for upstream calls.
///
/// Create with [`RequestQueue::new`], then call [`start`](Self::start) from
/// inside a Tokio runtime. [`close`](Self::close) stops the dispatch loop and
/// fails every pending handle.
pub struct RequestQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    config: QueueConfig,
    in_flight: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl RequestQueue {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        retry: RetryExecutor,
        config: QueueConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            rate_limiter,
            retry,
            config,
            in_flight: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Request queue mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_dispatcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.dispatcher.lock().unwrap_or_else(|poisoned| {
            warn!("Request queue dispatcher mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Spawn the dispatch loop. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut dispatcher = self.lock_dispatcher();
        if dispatcher.is_some() || self.lock_state().closed {
            return;
        }
        let queue = Arc::clone(self);
        *dispatcher = Some(tokio::spawn(async move { queue.run().await }));
        info!("Request queue dispatcher started");
    }

    /// Enqueue an upstream call.
    ///
    /// `request_fn` is invoked once per attempt, so it must build a fresh
    /// future each time it is called. The dispatch loop admits the first
    /// attempt; every retry waits for its own rate-limiter admission.
    pub fn enqueue<T, F, Fut>(&self, priority: i32, mut request_fn: F) -> QueueHandle<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let limiter = Arc::clone(&self.rate_limiter);
        let job: Job = Box::new(move |retry: RetryExecutor| {
            Box::pin(async move {
                let mut admitted = true;
                let result = retry
                    .execute(|| {
                        let needs_admission = !std::mem::replace(&mut admitted, false);
                        let limiter = Arc::clone(&limiter);
                        let attempt = request_fn();
                        async move {
                            if needs_admission {
                                limiter.acquire().await;
                            }
                            attempt.await
                        }
                    })
                    .await;
                // The caller may have stopped waiting
                let _ = tx.send(result);
            })
        });

        let mut state = self.lock_state();
        if state.closed {
            debug!("Request queue closed, rejecting task");
            // Dropping the job drops the sender, failing the handle
            return QueueHandle { rx };
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueueTask {
            priority,
            seq,
            enqueued_at: Instant::now(),
            job,
        });
        debug!(
            "Enqueued task #{} (priority {}), {} pending",
            seq,
            priority,
            state.heap.len()
        );
        drop(state);

        self.notify.notify_one();
        QueueHandle { rx }
    }

    /// Number of tasks waiting for dispatch (excludes the one in flight).
    pub fn len(&self) -> usize {
        self.lock_state().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a task is currently executing.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(AtomicOrdering::SeqCst)
    }

    /// Stop dispatching and fail every pending handle with `QueueClosed`.
    pub fn close(&self) {
        let pending = {
            let mut state = self.lock_state();
            state.closed = true;
            std::mem::take(&mut state.heap)
        };
        if !pending.is_empty() {
            info!("Request queue closing, dropping {} pending tasks", pending.len());
        }
        drop(pending);

        if let Some(handle) = self.lock_dispatcher().take() {
            handle.abort();
        }
        self.notify.notify_one();
    }

    /// How long the loop must wait before the next dispatch, or `None` when idle.
    fn next_wait(&self) -> Option<Duration> {
        let state = self.lock_state();
        if state.heap.is_empty() {
            return None;
        }

        let limit_wait = self.rate_limiter.time_until_available();
        if limit_wait > Duration::ZERO {
            debug!("Rate limit reached, rescheduling dispatch in {:?}", limit_wait);
            return Some(limit_wait);
        }

        let spacing_wait = state
            .last_dispatch
            .map(|last| (last + self.config.min_spacing).saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);
        Some(spacing_wait)
    }

    fn pop_admitted(&self) -> Option<QueueTask> {
        let mut state = self.lock_state();
        if state.heap.is_empty() || !self.rate_limiter.try_admit() {
            return None;
        }
        state.last_dispatch = Some(Instant::now());
        state.heap.pop()
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.lock_state().closed {
                return;
            }

            match self.next_wait() {
                None => {
                    self.notify.notified().await;
                    continue;
                }
                Some(wait) if wait > Duration::ZERO => {
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Some(_) => {}
            }

            let Some(task) = self.pop_admitted() else {
                continue;
            };

            debug!(
                "Dispatching task #{} (priority {}) after {:?} in queue",
                task.seq,
                task.priority,
                task.enqueued_at.elapsed()
            );
            self.in_flight.store(true, AtomicOrdering::SeqCst);
            (task.job)(self.retry.clone()).await;
            self.in_flight.store(false, AtomicOrdering::SeqCst);

            tokio::time::sleep(self.config.loop_delay).await;
        }
    }
}
