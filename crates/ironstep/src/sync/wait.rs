//! Composite waits: one primary condition or all of several others.
//!
//! Tokio has no native "A or (B and C and D)" wait, so the two halves run as
//! separate futures raced against each other; whichever loses is dropped.

use std::time::Duration;

use super::Event;

/// Index reported by [`WaitOutcome::index`] when the wait timed out.
pub const WAIT_TIMEOUT: usize = usize::MAX;

/// Which condition ended a [`wait_primary_or_all`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The primary event was set.
    Primary,
    /// Every one of the other events was set.
    AllOthers,
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitOutcome {
    /// `0` for the primary event, `1` for all others, [`WAIT_TIMEOUT`] otherwise.
    pub fn index(self) -> usize {
        match self {
            WaitOutcome::Primary => 0,
            WaitOutcome::AllOthers => 1,
            WaitOutcome::TimedOut => WAIT_TIMEOUT,
        }
    }
}

/// Wait until `primary` is set, or until every event in `others` has been set.
///
/// The primary event wins ties. An empty `others` slice completes immediately
/// with [`WaitOutcome::AllOthers`] unless the primary is already set.
pub async fn wait_primary_or_all(
    primary: &Event,
    others: &[Event],
    timeout: Option<Duration>,
) -> WaitOutcome {
    let race = async {
        tokio::select! {
            biased;
            _ = primary.wait() => WaitOutcome::Primary,
            _ = wait_all(others) => WaitOutcome::AllOthers,
        }
    };

    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, race)
            .await
            .unwrap_or(WaitOutcome::TimedOut),
        None => race.await,
    }
}

async fn wait_all(events: &[Event]) {
    // Manual-reset events stay set, so waiting in sequence observes each one.
    for event in events {
        event.wait().await;
    }
}
