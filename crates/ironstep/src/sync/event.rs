//! Manual-reset event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Error, Result};

/// A manual-reset event.
///
/// Once [`set`](Self::set), every current and future waiter passes until the
/// event is [`reset`](Self::reset). Clones share the same underlying event.
#[derive(Debug, Clone)]
pub struct Event {
    tx: Arc<watch::Sender<bool>>,
}

impl Event {
    /// Create an unset event.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Create an event that starts out set.
    pub fn new_set() -> Self {
        let event = Self::new();
        event.set();
        event
    }

    /// Set the event, releasing all waiters.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Reset the event so subsequent waiters block.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Returns `true` if the event is currently set.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the event is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|set| *set).await;
    }

    /// Wait until the event is set or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| Error::Timeout)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
