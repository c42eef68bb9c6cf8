//! A deduplicating, rate-limited work queue.
//!
//! Items move through three sets:
//!
//! - `queue` holds items waiting to be handed to a worker, in FIFO order;
//! - `dirty` holds every item that has been enqueued but not yet dequeued;
//! - `processing` holds items that a worker has dequeued but not marked `done`.
//!
//! An item enqueued while it is being processed is only marked dirty. It is moved back onto the
//! queue when the worker calls `done`, so a single item is never processed by two workers at
//! once.

mod metrics;
mod rate_limit;

pub use self::{metrics::QueueMetrics, rate_limit::RateLimiter};
use ahash::AHashSet as HashSet;
use parking_lot::Mutex;
use std::{collections::VecDeque, hash::Hash, sync::Arc};
use tokio::{sync::Notify, time};

/// A cloneable handle to a shared work queue.
#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    state: Mutex<State<T>>,
    limiter: Mutex<RateLimiter<T>>,
    notify: Notify,
    metrics: QueueMetrics,
}

#[derive(Debug)]
struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

// === impl WorkQueue ===

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(limiter: RateLimiter<T>, metrics: QueueMetrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                limiter: Mutex::new(limiter),
                notify: Notify::new(),
                metrics,
            }),
        }
    }

    /// Adds an item to the queue unless it is already waiting to be processed.
    pub fn enqueue(&self, item: T) {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(item.clone()) {
            return;
        }
        self.inner.metrics.adds.inc();
        if state.processing.contains(&item) {
            // Re-queued by `done`.
            return;
        }

        state.queue.push_back(item);
        self.inner.metrics.depth.set(state.queue.len() as i64);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Waits for the next item, or returns `None` once the queue is shut down.
    ///
    /// The returned item is in flight until it is passed to [`WorkQueue::done`].
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before inspecting the state so that a concurrent `enqueue` or
            // `shutdown` cannot be missed.
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    self.inner.metrics.depth.set(state.queue.len() as i64);
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Marks an item as no longer being processed.
    ///
    /// If the item was enqueued again while it was in flight, it is put back on the queue.
    pub fn done(&self, item: &T) {
        let mut state = self.inner.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) && !state.shutting_down {
            state.queue.push_back(item.clone());
            self.inner.metrics.depth.set(state.queue.len() as i64);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Enqueues an item after the rate limiter's delay.
    pub fn requeue(&self, item: T) {
        if self.is_shutting_down() {
            return;
        }

        let delay = self.inner.limiter.lock().when(&item);
        self.inner.metrics.retries.inc();
        tracing::trace!(?delay, "Requeueing");
        if delay.is_zero() {
            self.enqueue(item);
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            queue.enqueue(item);
        });
    }

    /// Clears an item's retry history, so that its next failure starts a fresh back-off.
    pub fn forget(&self, item: &T) {
        self.inner.limiter.lock().forget(item);
    }

    /// Returns the number of times an item has been requeued since it was last forgotten.
    pub fn retries(&self, item: &T) -> u32 {
        self.inner.limiter.lock().retries(item)
    }

    /// Returns the number of items waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the queue: pending and future calls to `dequeue` return `None` and further
    /// enqueues are ignored.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutting_down = true;
        state.queue.clear();
        state.dirty.clear();
        self.inner.metrics.depth.set(0);
        drop(state);
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(RateLimiter::default(), QueueMetrics::default())
    }
}
