use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Returned by [`DrainQueue::drain_all`] when nothing arrived before the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEmpty;

impl std::fmt::Display for QueueEmpty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue stayed empty until the drain timeout elapsed")
    }
}

impl std::error::Error for QueueEmpty {}

struct QueueState<T> {
    items: VecDeque<T>,
    dropped: u64,
}

/// Multi-producer queue whose consumer always takes everything at once.
///
/// `push` is synchronous so it can be called from a transport callback; it only ever waits for
/// the internal lock. Draining swaps the whole buffer out under that same lock, so an item is
/// returned by exactly one drain call.
pub struct DrainQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: Option<usize>,
}

impl<T> DrainQueue<T> {
    /// Unbounded queue. Growth is limited only by memory.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity: None,
        }
    }

    /// Queue holding at most `capacity` items; pushing into a full queue evicts the oldest item
    /// and bumps [`DrainQueue::dropped`]. A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// Appends an item. Returns `true` when an older item was evicted to make room.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        let mut evicted = false;
        if let Some(capacity) = self.capacity {
            if state.items.len() >= capacity {
                state.items.pop_front();
                state.dropped = state.dropped.saturating_add(1);
                evicted = true;
            }
        }
        state.items.push_back(item);
        drop(state);
        self.notify.notify_one();
        evicted
    }

    /// Removes and returns every queued item, or an empty batch right away.
    pub fn try_drain_all(&self) -> Vec<T> {
        let taken = {
            let mut state = self.lock();
            std::mem::take(&mut state.items)
        };
        Vec::from(taken)
    }

    /// Waits up to `timeout` for at least one item, then removes and returns everything queued.
    pub async fn drain_all(&self, timeout: Duration) -> Result<Vec<T>, QueueEmpty> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let batch = self.try_drain_all();
            if !batch.is_empty() {
                return Ok(batch);
            }

            if timeout_at(deadline, notified).await.is_err() {
                let batch = self.try_drain_all();
                if batch.is_empty() {
                    return Err(QueueEmpty);
                }
                return Ok(batch);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Items evicted by a bounded queue since creation. Always zero when unbounded.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    // A panic while holding the lock cannot leave `items` half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for DrainQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
