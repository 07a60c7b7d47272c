//! The activity-graph state machine.
//!
//! [`InstanceRun`] drives one instance through its scheme:
//!
//! 1. `Created`: the root is entered; composites enter their start child
//!    until a leaf is reached
//! 2. `Running`: the current leaf's action runs with freshly resolved
//!    parameters and returns a transition key; the engine leaves the
//!    activity and enters the target
//! 3. An action that asked to sleep or wait suspends the instance with its
//!    key kept as the pending key; resuming navigates with that key without
//!    running the action again
//! 4. Reaching the end of a nested sub-graph leaves the composite and
//!    navigates with the composite's default key; at root level the
//!    instance completes
//!
//! Every entered activity is initialized once and uninitialized once, also
//! when the instance faults or is cancelled. In those cases the active chain
//! is unwound deepest first.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::activity::{Activity, ActivityRegistry};
use crate::context::{
    ActivityContext, ExecutionContext, FaultInfo, InstanceStatus, SuspendRequest, Suspension,
};
use crate::error::{Error, Result};
use crate::param::{Parameters, Properties};
use crate::scheme::{ActivityId, Scheme, Target, TransitionKey};
use crate::sync::Event;

/// Why an instance is being advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    /// Start a created instance, or continue one that was running.
    Start,
    /// A timer fired or every awaited signal arrived.
    Wake,
    /// A signal wait ran out of time.
    Timeout,
}

/// Result of advancing an instance.
#[derive(Debug)]
pub(crate) enum Step {
    Suspended(SuspendRequest),
    Completed,
    Faulted(Arc<Error>),
    Cancelled,
}

enum Flow {
    Continue,
    Completed,
}

struct Entered {
    id: ActivityId,
    object: Box<dyn Activity>,
}

/// Live state of one instance: its context plus the activity objects of the
/// active chain, root first.
pub(crate) struct InstanceRun {
    ctx: ExecutionContext,
    scheme: Arc<Scheme>,
    chain: Vec<Entered>,
}

impl InstanceRun {
    /// Wrap the context of an instance that has not started yet.
    pub(crate) fn new(scheme: Arc<Scheme>, ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            scheme,
            chain: Vec::new(),
        }
    }

    /// Rebuild the active chain of a persisted instance.
    ///
    /// Activity objects are created fresh and restored from their snapshots;
    /// `initialize` is not called again.
    pub(crate) fn restore(
        scheme: Arc<Scheme>,
        ctx: ExecutionContext,
        registry: &ActivityRegistry,
    ) -> Result<Self> {
        let mut run = Self::new(scheme, ctx);
        if run.ctx.status().is_finished() || run.ctx.active_path().is_empty() {
            return Ok(run);
        }

        let ids = run
            .scheme
            .resolve_path(run.ctx.active_path())
            .ok_or_else(|| Error::InvalidState {
                instance_id: run.ctx.instance_id(),
                operation: "restore",
                status: format!(
                    "positioned at `{}`, which scheme `{}` does not contain",
                    run.ctx.active_path().join("/"),
                    run.scheme.name()
                ),
            })?;

        for id in ids {
            let def = run.scheme.activity(id);
            let mut object = registry.create(def)?;
            if let Some(state) = run.ctx.activity_state(def.name()).cloned() {
                object.restore(state)?;
            }
            run.chain.push(Entered { id, object });
        }
        Ok(run)
    }

    pub(crate) fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub(crate) fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    #[cfg(test)]
    pub(crate) fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    pub(crate) fn status(&self) -> InstanceStatus {
        self.ctx.status()
    }

    /// Refresh activity snapshots and return the context to persist.
    pub(crate) fn snapshot(&mut self) -> &ExecutionContext {
        for entered in &self.chain {
            let name = self.scheme.activity(entered.id).name();
            self.ctx.set_activity_state(name, entered.object.snapshot());
        }
        &self.ctx
    }

    /// Advance the instance until it suspends or finishes.
    ///
    /// Returns `None` for stale wake-ups, e.g. a timer that fires after the
    /// instance was resumed some other way.
    pub(crate) async fn advance(
        &mut self,
        registry: &ActivityRegistry,
        resume: Resume,
        cancel: &Event,
    ) -> Option<Step> {
        if cancel.is_set() && !self.status().is_finished() {
            return Some(self.cancel().await);
        }

        let entry = match (resume, self.status()) {
            (Resume::Start, InstanceStatus::Created) => {
                self.ctx.set_status(InstanceStatus::Running);
                let root = self.scheme.root().id();
                self.enter(root, registry).await
            }
            (Resume::Start, InstanceStatus::Running) => Ok(Flow::Continue),
            (Resume::Wake, InstanceStatus::Sleeping) => self.wake(None, registry).await,
            (Resume::Wake, InstanceStatus::WaitingExternal)
                if self.ctx.suspension().is_some_and(Suspension::all_received) =>
            {
                self.wake(None, registry).await
            }
            (Resume::Timeout, InstanceStatus::WaitingExternal) => {
                let key = match self.ctx.suspension() {
                    Some(Suspension::WaitingExternal {
                        timeout_key: Some(key),
                        ..
                    }) => key.clone(),
                    _ => TransitionKey::default(),
                };
                self.wake(Some(key), registry).await
            }
            (resume, status) => {
                debug!(
                    instance_id = %self.ctx.instance_id(),
                    ?resume,
                    %status,
                    "Ignoring stale work item"
                );
                return None;
            }
        };

        let step = match entry {
            Ok(Flow::Completed) => Ok(Step::Completed),
            Ok(Flow::Continue) => self.execute_loop(registry, cancel).await,
            Err(err) => Err(err),
        };

        Some(match step {
            Ok(Step::Completed) => {
                self.ctx.active_path_mut().clear();
                self.ctx.set_pending(None, None);
                self.ctx.set_status(InstanceStatus::Completed);
                Step::Completed
            }
            Ok(step) => step,
            Err(err) => self.fault(err).await,
        })
    }

    /// Cancel the instance, unwinding the active chain.
    ///
    /// Idempotent: finished instances are left as they are.
    pub(crate) async fn cancel(&mut self) -> Step {
        if self.status().is_finished() {
            return Step::Cancelled;
        }
        self.unwind().await;
        self.ctx.set_pending(None, None);
        self.ctx.set_status(InstanceStatus::Cancelled);
        debug!(instance_id = %self.ctx.instance_id(), "Instance cancelled");
        Step::Cancelled
    }

    async fn wake(
        &mut self,
        timeout_key: Option<TransitionKey>,
        registry: &ActivityRegistry,
    ) -> Result<Flow> {
        let (pending, suspension) = self.ctx.take_suspension();
        if let Some(Suspension::WaitingExternal { received, .. }) = suspension {
            self.ctx.signals_mut().extend(received);
        }
        self.ctx.set_status(InstanceStatus::Running);

        let key = match timeout_key.or(pending) {
            Some(key) => key,
            None => self.current_default_key(),
        };
        debug!(instance_id = %self.ctx.instance_id(), %key, "Resuming instance");
        self.navigate(key, registry).await
    }

    fn current_default_key(&self) -> TransitionKey {
        self.chain
            .last()
            .map(|e| self.scheme.activity(e.id).default_key().clone())
            .unwrap_or_default()
    }

    async fn execute_loop(&mut self, registry: &ActivityRegistry, cancel: &Event) -> Result<Step> {
        loop {
            if cancel.is_set() {
                return Ok(self.cancel().await);
            }

            let scheme = Arc::clone(&self.scheme);
            let Some((leaf, ancestors)) = self.chain.split_last_mut() else {
                return Ok(Step::Completed);
            };
            let def = scheme.activity(leaf.id);
            let params = {
                let root: &dyn Properties = match ancestors.first() {
                    Some(root) => &*root.object,
                    None => &*leaf.object,
                };
                Parameters::resolve(def.name(), def.parameter_expressions(), &*leaf.object, root)?
            };

            let instance_id = self.ctx.instance_id();
            let (variables, signals) = self.ctx.activity_parts();
            let mut actx = ActivityContext::new(instance_id, def, variables, signals, true);
            let key = leaf
                .object
                .execute(&mut actx, &params)
                .await
                .map_err(|err| action_fault(def.name(), err))?;
            let request = actx.take_request();

            debug!(
                instance_id = %instance_id,
                activity = def.name(),
                %key,
                "Activity executed"
            );

            if let Some(request) = request {
                self.suspend(key, &request)
                    .map_err(|err| action_fault(def.name(), err))?;
                return Ok(Step::Suspended(request));
            }

            if let Flow::Completed = self.navigate(key, registry).await? {
                return Ok(Step::Completed);
            }
        }
    }

    /// Record the suspension an action asked for.
    ///
    /// Signals that arrived before the wait count as already received.
    fn suspend(&mut self, key: TransitionKey, request: &SuspendRequest) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let (status, suspension) = match request {
            SuspendRequest::Sleep(duration) => (
                InstanceStatus::Sleeping,
                Suspension::Sleeping {
                    until: deadline(now, *duration)?,
                },
            ),
            SuspendRequest::Signals { signals, timeout } => {
                let expires = match timeout {
                    Some((after, _)) => Some(deadline(now, *after)?),
                    None => None,
                };
                let signals: Vec<String> = signals.iter().cloned().collect();
                let received = self.ctx.take_buffered_signals(&signals);
                (
                    InstanceStatus::WaitingExternal,
                    Suspension::WaitingExternal {
                        signals,
                        received,
                        deadline: expires,
                        timeout_key: timeout.as_ref().map(|(_, key)| key.clone()),
                    },
                )
            }
        };
        self.ctx.set_pending(Some(key), Some(suspension));
        self.ctx.set_status(status);
        debug!(
            instance_id = %self.ctx.instance_id(),
            %status,
            "Instance suspended"
        );
        Ok(())
    }

    /// Follow `key` from the current leaf.
    ///
    /// A leaf without transitions ends its sub-graph whatever the key; a key
    /// missing from a non-empty mapping is a navigation error.
    async fn navigate(&mut self, key: TransitionKey, registry: &ActivityRegistry) -> Result<Flow> {
        let mut key = key;
        loop {
            let Some(current) = self.chain.last().map(|e| e.id) else {
                return Ok(Flow::Completed);
            };
            let def = self.scheme.activity(current);
            let target = if def.is_terminal() {
                Target::End
            } else {
                def.target(&key).ok_or_else(|| Error::Navigation {
                    activity: def.name().to_owned(),
                    key: key.clone(),
                })?
            };

            self.exit().await?;
            match target {
                Target::Activity(next) => {
                    debug!(
                        instance_id = %self.ctx.instance_id(),
                        from = self.scheme.activity(current).name(),
                        to = self.scheme.activity(next).name(),
                        %key,
                        "Transition"
                    );
                    return self.enter(next, registry).await;
                }
                Target::End => match self.chain.last() {
                    None => return Ok(Flow::Completed),
                    Some(parent) => key = self.scheme.activity(parent.id).default_key().clone(),
                },
            }
        }
    }

    /// Enter `id`, then the start children of composites down to a leaf.
    async fn enter(&mut self, id: ActivityId, registry: &ActivityRegistry) -> Result<Flow> {
        let scheme = Arc::clone(&self.scheme);
        let mut next = Some(id);
        while let Some(id) = next {
            let def = scheme.activity(id);
            let object = registry
                .create(def)
                .map_err(|err| action_fault(def.name(), err))?;
            self.chain.push(Entered { id, object });
            self.ctx.active_path_mut().push(def.name().to_owned());

            let instance_id = self.ctx.instance_id();
            let (variables, signals) = self.ctx.activity_parts();
            let mut actx = ActivityContext::new(instance_id, def, variables, signals, false);
            if let Some(entered) = self.chain.last_mut() {
                entered
                    .object
                    .initialize(&mut actx)
                    .await
                    .map_err(|err| action_fault(def.name(), err))?;
            }
            debug!(instance_id = %instance_id, activity = def.name(), "Activity entered");

            next = def.start();
        }
        Ok(Flow::Continue)
    }

    /// Leave the current leaf.
    async fn exit(&mut self) -> Result<()> {
        let Some(mut entered) = self.chain.pop() else {
            return Ok(());
        };
        let scheme = Arc::clone(&self.scheme);
        let def = scheme.activity(entered.id);
        self.ctx.active_path_mut().pop();
        self.ctx.set_activity_state(def.name(), None);

        let instance_id = self.ctx.instance_id();
        let (variables, signals) = self.ctx.activity_parts();
        let mut actx = ActivityContext::new(instance_id, def, variables, signals, false);
        entered
            .object
            .uninitialize(&mut actx)
            .await
            .map_err(|err| action_fault(def.name(), err))?;
        debug!(instance_id = %instance_id, activity = def.name(), "Activity left");
        Ok(())
    }

    /// Uninitialize every entered activity, deepest first.
    ///
    /// Failures are logged; the unwind always completes.
    async fn unwind(&mut self) {
        while let Some(current) = self.chain.last().map(|e| e.id) {
            if let Err(err) = self.exit().await {
                warn!(
                    instance_id = %self.ctx.instance_id(),
                    activity = self.scheme.activity(current).name(),
                    error = %err,
                    "Uninitialize failed while unwinding"
                );
            }
        }
        self.ctx.active_path_mut().clear();
        self.ctx.clear_activity_states();
    }

    async fn fault(&mut self, err: Error) -> Step {
        let activity = match &err {
            Error::Binding { activity, .. }
            | Error::Navigation { activity, .. }
            | Error::ActionFault { activity, .. } => Some(activity.clone()),
            _ => self.ctx.current_activity().map(str::to_owned),
        };
        warn!(
            instance_id = %self.ctx.instance_id(),
            activity = activity.as_deref().unwrap_or("-"),
            error = %err,
            "Instance faulted"
        );

        self.unwind().await;
        self.ctx.set_pending(None, None);
        self.ctx.set_fault(FaultInfo {
            activity,
            kind: err.kind().to_owned(),
            message: err.to_string(),
        });
        self.ctx.set_status(InstanceStatus::Faulted);
        Step::Faulted(Arc::new(err))
    }
}

/// `now + after`, failing for instants `OffsetDateTime` cannot represent.
fn deadline(now: OffsetDateTime, after: std::time::Duration) -> Result<OffsetDateTime> {
    time::Duration::try_from(after)
        .ok()
        .and_then(|after| now.checked_add(after))
        .ok_or(Error::Precondition("suspension deadline is out of range"))
}

/// Attribute an error raised by activity code to `activity`.
fn action_fault(activity: &str, err: Error) -> Error {
    match err {
        Error::Binding { .. } | Error::Navigation { .. } | Error::ActionFault { .. } => err,
        other => Error::ActionFault {
            activity: activity.to_owned(),
            source: Box::new(other),
        },
    }
}
