//! Per-instance bookkeeping held by the runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

use super::WorkItem;
use super::host::RuntimeInner;
use crate::context::{InstanceId, InstanceStatus, SuspendRequest, Suspension};
use crate::engine::{InstanceRun, Resume};
use crate::error::{Error, Result};
use crate::sync::{Event, TimedSignal, WaitOutcome, lock, wait_primary_or_all};

/// What a parked instance is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Parking {
    Sleep(Duration),
    Signals {
        signals: Vec<String>,
        /// Signals that already arrived.
        received: Vec<String>,
        timeout: Option<Duration>,
    },
}

impl Parking {
    /// Parking for a suspension the engine just requested.
    ///
    /// `suspension` is the recorded suspension; signals it already holds
    /// start out delivered.
    pub(crate) fn from_request(request: &SuspendRequest, suspension: Option<&Suspension>) -> Self {
        match request {
            SuspendRequest::Sleep(duration) => Parking::Sleep(*duration),
            SuspendRequest::Signals { signals, timeout } => Parking::Signals {
                signals: signals.iter().cloned().collect(),
                received: match suspension {
                    Some(Suspension::WaitingExternal { received, .. }) => {
                        received.keys().cloned().collect()
                    }
                    _ => Vec::new(),
                },
                timeout: timeout.as_ref().map(|(duration, _)| *duration),
            },
        }
    }

    /// Parking for a persisted suspension, with deadlines measured from `now`.
    ///
    /// Deadlines that already passed give a zero wait.
    pub(crate) fn from_suspension(suspension: &Suspension, now: OffsetDateTime) -> Self {
        let remaining = |deadline: OffsetDateTime| {
            Duration::try_from(deadline - now).unwrap_or(Duration::ZERO)
        };
        match suspension {
            Suspension::Sleeping { until } => Parking::Sleep(remaining(*until)),
            Suspension::WaitingExternal {
                signals,
                received,
                deadline,
                ..
            } => Parking::Signals {
                signals: signals.clone(),
                received: received.keys().cloned().collect(),
                timeout: deadline.map(remaining),
            },
        }
    }
}

#[derive(Default)]
struct Parked {
    timer: Option<TimedSignal>,
    task: Option<JoinHandle<()>>,
    signals: HashMap<String, Event>,
}

/// A loaded instance.
///
/// `run` is `None` while the live state is unloaded and only the persisted
/// context exists.
pub(crate) struct InstanceSlot {
    id: InstanceId,
    pub(crate) run: tokio::sync::Mutex<Option<InstanceRun>>,
    status: watch::Sender<InstanceStatus>,
    cancel: Event,
    parked: Mutex<Parked>,
    fault: Mutex<Option<Arc<Error>>>,
}

impl InstanceSlot {
    pub(crate) fn new(id: InstanceId, run: InstanceRun) -> Self {
        let (status, _rx) = watch::channel(run.status());
        Self {
            id,
            run: tokio::sync::Mutex::new(Some(run)),
            status,
            cancel: Event::new(),
            parked: Mutex::new(Parked::default()),
            fault: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn status(&self) -> InstanceStatus {
        *self.status.borrow()
    }

    pub(crate) fn publish(&self, status: InstanceStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<InstanceStatus> {
        self.status.subscribe()
    }

    pub(crate) fn cancel_event(&self) -> &Event {
        &self.cancel
    }

    pub(crate) fn fault(&self) -> Option<Arc<Error>> {
        lock(&self.fault).clone()
    }

    pub(crate) fn set_fault(&self, err: Arc<Error>) {
        *lock(&self.fault) = Some(err);
    }

    /// Wait outside the worker pool and re-enqueue the instance when the
    /// timer fires, every awaited signal arrived or the wait times out.
    ///
    /// Replaces any previous parking. The task exits without enqueuing when
    /// the cancel event is set.
    pub(crate) fn park(&self, parking: Parking, runtime: Weak<RuntimeInner>) -> Result<()> {
        self.unpark();

        let mut parked = lock(&self.parked);
        let (events, timeout) = match parking {
            Parking::Sleep(delay) => {
                let timer = TimedSignal::new();
                timer.reset(delay)?;
                let events = vec![timer.event()];
                parked.timer = Some(timer);
                (events, None)
            }
            Parking::Signals {
                signals,
                received,
                timeout,
            } => {
                let mut events = Vec::with_capacity(signals.len());
                for name in signals {
                    let event = Event::new();
                    if received.contains(&name) {
                        event.set();
                    }
                    events.push(event.clone());
                    parked.signals.insert(name, event);
                }
                (events, timeout)
            }
        };

        let id = self.id;
        let cancel = self.cancel.clone();
        parked.task = Some(tokio::spawn(async move {
            let resume = match wait_primary_or_all(&cancel, &events, timeout).await {
                WaitOutcome::Primary => return,
                WaitOutcome::AllOthers => Resume::Wake,
                WaitOutcome::TimedOut => Resume::Timeout,
            };
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            trace!(instance_id = %id, ?resume, "Parked instance ready");
            runtime.dispatch(WorkItem::new(id, resume)).await;
        }));
        Ok(())
    }

    /// Stop waiting: dispose the timer, abort the parked task and forget the
    /// awaited signals.
    pub(crate) fn unpark(&self) {
        let mut parked = lock(&self.parked);
        if let Some(timer) = parked.timer.take() {
            timer.dispose();
        }
        if let Some(task) = parked.task.take() {
            task.abort();
        }
        parked.signals.clear();
    }

    /// Mark an awaited signal as delivered.
    pub(crate) fn deliver(&self, signal: &str) {
        if let Some(event) = lock(&self.parked).signals.get(signal) {
            event.set();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_parked(&self) -> bool {
        lock(&self.parked).task.is_some()
    }
}
