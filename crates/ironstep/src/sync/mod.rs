//! Synchronization primitives used by the runtime.
//!
//! - [`Event`] — manual-reset event shared between tasks
//! - [`GuardedQueue`] — closable work queue with timed dequeue
//! - [`TimedSignal`] — event that sets itself after a delay
//! - [`wait_primary_or_all`] — block until one condition or all of several others

mod event;
mod queue;
mod timed;
mod wait;

pub use event::Event;
pub use queue::GuardedQueue;
pub use timed::{SignalState, TimedSignal};
pub use wait::{WAIT_TIMEOUT, WaitOutcome, wait_primary_or_all};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// All state guarded here is updated in single assignments, so a poisoned
/// lock never exposes a half-applied transition.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
