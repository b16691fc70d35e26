//! Deduplicating, rate-limited work queue
//!
//! The queue is the synchronization point between the watch dispatcher
//! (producer) and the reconciliation workers (consumers). A key that is
//! already queued is not queued twice, and a key that is re-added while a
//! worker holds it is delivered again only after that worker calls
//! [`WorkQueue::done`]. Failed keys come back through
//! [`WorkQueue::add_rate_limited`] with an exponentially growing delay
//! tracked per key.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

/// Exponential backoff parameters for failed keys.
///
/// The delay for the n-th consecutive failure of a key is
/// `base * factor^(n-1)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on the delay
    pub max: Duration,
    /// Multiplier applied per additional failure
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        // Same shape as the default item-exponential controller rate limiter.
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before re-delivering a key that has failed `failures` times.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = self.base.as_secs_f64() * self.factor.powi(failures as i32 - 1);
        if !exp.is_finite() || exp >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(exp)
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Keys ready for delivery, in arrival order
    queue: VecDeque<String>,
    /// Keys queued or awaiting requeue; membership makes `add` a no-op
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Consecutive failures per key, cleared by `forget`
    retries: HashMap<String, u32>,
    shutting_down: bool,
}

/// Work queue of reconciliation keys.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: BackoffPolicy,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl WorkQueue {
    #[must_use]
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
        }
    }

    /// Queue a key for processing.
    ///
    /// No-op if the key is already queued. If the key is currently being
    /// processed it is re-queued when the worker calls [`Self::done`], so an
    /// update arriving mid-processing is never lost.
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.state.lock().unwrap();
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Block until a key is available or the queue shuts down.
    ///
    /// Returns `None` once the queue is shutting down and drained; workers
    /// should then exit their loop. The returned key is claimed by the
    /// caller until it passes it back to [`Self::done`].
    pub async fn get(&self) -> Option<String> {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register for wakeup before checking state so a concurrent
            // add/shutdown between the check and the await is not missed.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release the processing claim on a key, re-queueing it if it was
    /// re-added while in flight.
    pub fn done(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Clear the retry counter for a key.
    pub fn forget(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.retries.remove(key);
    }

    /// Re-queue a failed key after its backoff delay, incrementing its
    /// retry counter.
    pub fn add_rate_limited(self: &Arc<Self>, key: impl Into<String>) {
        let key = key.into();
        let delay = {
            let mut state = self.state.lock().unwrap();
            if state.shutting_down {
                return;
            }
            let failures = state.retries.entry(key.clone()).or_insert(0);
            *failures += 1;
            self.backoff.delay(*failures)
        };
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Consecutive failures recorded for a key.
    #[must_use]
    pub fn requeues(&self, key: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.retries.get(key).copied().unwrap_or(0)
    }

    /// Close the queue and wake every blocked [`Self::get`].
    ///
    /// Already-queued keys are still delivered; once the queue is empty all
    /// waiters observe `None`.
    pub fn shut_down(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutting_down = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Number of keys waiting for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
