//! Event that sets itself after a delay.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use super::{Event, lock};
use crate::error::{Error, Result};

/// Observable state of a [`TimedSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    /// Not armed and not set.
    Unset,
    /// A timer is running; the signal sets when it expires.
    Armed,
    /// The delay elapsed.
    Set,
}

/// A resettable signal that fires automatically after a delay.
///
/// Each [`reset`](Self::reset) cancels the running timer and starts a new
/// one. The timer task checks a generation counter under the same lock that
/// guards [`cancel`](Self::cancel) and [`dispose`](Self::dispose), so a timer
/// that lost the race never sets a cancelled or disposed signal.
///
/// Dropping the signal disposes it.
#[derive(Debug)]
pub struct TimedSignal {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<TimerState>,
    event: Event,
}

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    armed: bool,
    disposed: bool,
    task: Option<JoinHandle<()>>,
}

impl TimerState {
    /// Invalidate the running timer, if any.
    fn disarm(&mut self) {
        self.generation += 1;
        self.armed = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Shared {
    fn fire(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.disposed || state.generation != generation {
            trace!(generation, "stale timer expired, ignoring");
            return;
        }
        state.armed = false;
        state.task = None;
        self.event.set();
    }
}

impl TimedSignal {
    /// Create an unset, unarmed signal.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState::default()),
                event: Event::new(),
            }),
        }
    }

    /// Unset the signal and arm it to fire after `delay`.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`Error::Closed`] after [`dispose`](Self::dispose).
    pub fn reset(&self, delay: Duration) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if state.disposed {
            return Err(Error::Closed);
        }

        state.disarm();
        state.armed = true;
        self.shared.event.reset();

        let generation = state.generation;
        let shared = Arc::clone(&self.shared);
        state.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(generation);
        }));
        Ok(())
    }

    /// Stop a pending timer without setting the signal.
    ///
    /// Idempotent, and safe to call after [`dispose`](Self::dispose).
    pub fn cancel(&self) {
        lock(&self.shared.state).disarm();
    }

    /// Cancel any pending timer and make the signal permanently unusable.
    ///
    /// Idempotent.
    pub fn dispose(&self) {
        let mut state = lock(&self.shared.state);
        state.disarm();
        state.disposed = true;
    }

    /// Returns `true` once the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.state).disposed
    }

    /// Current state of the signal.
    pub fn state(&self) -> SignalState {
        let state = lock(&self.shared.state);
        if self.shared.event.is_set() {
            SignalState::Set
        } else if state.armed {
            SignalState::Armed
        } else {
            SignalState::Unset
        }
    }

    /// Returns `true` if the delay elapsed.
    pub fn is_set(&self) -> bool {
        self.shared.event.is_set()
    }

    /// The event this signal sets, for use in composite waits.
    pub fn event(&self) -> Event {
        self.shared.event.clone()
    }

    /// Wait until the signal fires.
    pub async fn wait(&self) {
        self.shared.event.wait().await;
    }
}

impl Default for TimedSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimedSignal {
    fn drop(&mut self) {
        self.dispose();
    }
}
