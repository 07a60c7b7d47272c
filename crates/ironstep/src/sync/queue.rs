//! Closable work queue with blocking and timed dequeue.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Event, lock};
use crate::error::{Error, Result};

/// A thread-safe FIFO queue that can be closed.
///
/// All state transitions happen under one mutex: the item buffer, the
/// closed flag and the *emptied* event move together, so no caller observes
/// an item count that disagrees with the emptied event.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use ironstep::sync::GuardedQueue;
///
/// let queue = GuardedQueue::unbounded();
/// queue.enqueue(1).await?;
/// assert_eq!(queue.dequeue(Duration::from_millis(10)).await?, 1);
/// ```
#[derive(Debug)]
pub struct GuardedQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    item_ready: Notify,
    space_ready: Notify,
    emptied: Event,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

enum PushError<T> {
    Closed,
    Full(T),
}

impl<T> GuardedQueue<T> {
    /// Create a queue without a capacity limit.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Create a queue holding at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            emptied: Event::new_set(),
        }
    }

    /// Add an item, waiting for room if the queue is bounded and full.
    ///
    /// Fails with [`Error::Closed`] once the queue is closed.
    pub async fn enqueue(&self, item: T) -> Result<()> {
        let mut item = item;
        loop {
            let mut notified = pin!(self.space_ready.notified());
            notified.as_mut().enable();

            match self.push(item) {
                Ok(()) => return Ok(()),
                Err(PushError::Closed) => return Err(Error::Closed),
                Err(PushError::Full(rejected)) => item = rejected,
            }

            notified.await;
        }
    }

    /// Add an item without waiting.
    ///
    /// Returns `false` if the queue is closed or full.
    pub fn try_enqueue(&self, item: T) -> bool {
        self.push(item).is_ok()
    }

    /// Remove the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// Items enqueued before [`close`](Self::close) are still delivered; once
    /// the queue is closed *and* empty this fails with [`Error::Closed`].
    /// Fails with [`Error::Timeout`] if nothing arrives in time.
    pub async fn dequeue(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.item_ready.notified());
            notified.as_mut().enable();

            if let Some(item) = self.pop()? {
                return Ok(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout);
            }
        }
    }

    /// Remove the oldest item if one is available.
    pub fn try_dequeue(&self) -> Option<T> {
        self.pop().ok().flatten()
    }

    /// Close the queue, waking every blocked caller.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    /// Drop all pending items and signal the emptied event.
    ///
    /// Returns the number of discarded items.
    pub fn clear(&self) -> usize {
        let discarded = {
            let mut state = lock(&self.state);
            let discarded = state.items.len();
            state.items.clear();
            self.emptied.set();
            discarded
        };
        self.space_ready.notify_waiters();
        discarded
    }

    /// Clear and close the queue; it can never be used again.
    pub fn dispose(&self) {
        {
            let mut state = lock(&self.state);
            state.items.clear();
            state.closed = true;
            self.emptied.set();
        }
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    /// Wait until the queue has no pending items.
    pub async fn wait_empty(&self) {
        self.emptied.wait().await;
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Returns `true` if no items are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the queue has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn push(&self, item: T) -> std::result::Result<(), PushError<T>> {
        {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(PushError::Closed);
            }
            if self.capacity.is_some_and(|capacity| state.items.len() >= capacity) {
                return Err(PushError::Full(item));
            }
            state.items.push_back(item);
            self.emptied.reset();
        }
        self.item_ready.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<Option<T>> {
        let item = {
            let mut state = lock(&self.state);
            match state.items.pop_front() {
                Some(item) => {
                    if state.items.is_empty() {
                        self.emptied.set();
                    }
                    item
                }
                None if state.closed => return Err(Error::Closed),
                None => return Ok(None),
            }
        };
        self.space_ready.notify_one();
        Ok(Some(item))
    }
}
