//! Deduplicating, rate-limited work queue
//!
//! Decouples watch notification delivery from reconciliation. Identifiers
//! enqueued while already pending collapse to one entry, and a key being
//! processed is never handed to a second worker; a re-add during processing
//! is deferred until `done`. Failed keys are re-queued with exponential
//! backoff via `add_rate_limited`, up to a ceiling enforced by the caller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// A work queue of `namespace/name` identifiers.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

#[derive(Default)]
struct QueueState {
    /// Keys waiting to be handed to a worker, in FIFO order.
    queue: VecDeque<String>,
    /// Keys known to the queue but not yet picked up; dedups `add`.
    dirty: HashSet<String>,
    /// Keys currently held by a worker.
    processing: HashSet<String>,
    /// Per-key failure counts; reset by `forget`.
    retries: HashMap<String, u32>,
    shutting_down: bool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::with_delays(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    /// Create a queue with explicit backoff bounds.
    pub fn with_delays(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            base_delay,
            max_delay,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a key. No-op if the key is already pending; deferred until
    /// `done` if the key is currently being processed.
    pub fn add(&self, key: &str) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        if !state.dirty.insert(key.to_string()) {
            return;
        }
        if state.processing.contains(key) {
            return;
        }
        state.queue.push_back(key.to_string());
        drop(state);
        self.notify.notify_one();
    }

    /// Re-enqueue a key after an exponential backoff delay, growing with the
    /// number of failures recorded for the key.
    pub fn add_rate_limited(self: &Arc<Self>, key: &str) {
        let attempts = {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            let attempts = state.retries.entry(key.to_string()).or_insert(0);
            *attempts += 1;
            *attempts
        };
        let delay = self.retry_delay(attempts);
        debug!(key, attempts, ?delay, "scheduling rate-limited requeue");

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Backoff delay for the given failure count: `base * 2^(attempts-1)`,
    /// capped at the configured maximum.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let shift = attempts.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Number of times the key has been re-queued via `add_rate_limited`
    /// since it was last forgotten.
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.state().retries.get(key).copied().unwrap_or(0)
    }

    /// Drop the key from retry tracking, resetting its failure count.
    pub fn forget(&self, key: &str) {
        self.state().retries.remove(key);
    }

    /// Take the next key, waiting while the queue is empty. Returns `None`
    /// once the queue has been shut down and drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark a key's processing finished. If the key was re-added while being
    /// processed it goes back onto the queue now.
    pub fn done(&self, key: &str) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting new work and wake blocked workers; `get` drains the
    /// remaining items and then returns `None`.
    pub fn shutdown(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_dedups_pending_keys() {
        let q = WorkQueue::new();
        q.add("default/orders");
        q.add("default/orders");
        q.add("default/orders");
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn test_get_marks_processing_and_done_releases() {
        let q = WorkQueue::new();
        q.add("default/orders");

        let key = q.get().await.unwrap();
        assert_eq!(key, "default/orders");
        assert!(q.is_empty());

        // Re-add while processing is deferred until done
        q.add("default/orders");
        assert!(q.is_empty());

        q.done("default/orders");
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn test_done_without_readd_leaves_queue_empty() {
        let q = WorkQueue::new();
        q.add("default/orders");
        let key = q.get().await.unwrap();
        q.done(&key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_returns_none() {
        let q = WorkQueue::new();
        q.add("default/a");
        q.shutdown();

        // Existing work still drains
        assert_eq!(q.get().await.as_deref(), Some("default/a"));
        // New adds are rejected
        q.add("default/b");
        assert!(q.get().await.is_none());
    }

    #[tokio::test]
    async fn test_get_blocks_until_add() {
        let q = Arc::new(WorkQueue::new());
        let getter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.add("default/orders");
        let got = getter.await.unwrap();
        assert_eq!(got.as_deref(), Some("default/orders"));
    }

    #[tokio::test]
    async fn test_rate_limited_requeue_delivers_and_counts() {
        let q = Arc::new(WorkQueue::with_delays(
            Duration::from_millis(1),
            Duration::from_millis(8),
        ));
        q.add_rate_limited("default/orders");
        assert_eq!(q.num_requeues("default/orders"), 1);

        let key = q.get().await.unwrap();
        assert_eq!(key, "default/orders");
        q.done(&key);

        q.add_rate_limited("default/orders");
        assert_eq!(q.num_requeues("default/orders"), 2);

        q.forget("default/orders");
        assert_eq!(q.num_requeues("default/orders"), 0);
    }

    #[test]
    fn test_retry_delay_grows_exponentially_and_caps() {
        let q = WorkQueue::with_delays(Duration::from_millis(5), Duration::from_secs(1000));
        assert_eq!(q.retry_delay(1), Duration::from_millis(5));
        assert_eq!(q.retry_delay(2), Duration::from_millis(10));
        assert_eq!(q.retry_delay(3), Duration::from_millis(20));
        assert_eq!(q.retry_delay(10), Duration::from_millis(5 * 512));
        // Far past the cap
        assert_eq!(q.retry_delay(40), Duration::from_secs(1000));
    }
}
