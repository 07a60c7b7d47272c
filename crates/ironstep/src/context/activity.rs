use std::collections::BTreeMap;
use std::time::Duration;

use nonempty::NonEmpty;
use serde_json::Value;

use super::InstanceId;
use crate::error::{Error, Result};
use crate::scheme::{ActivityDef, TransitionKey};

/// Suspension requested by an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SuspendRequest {
    Sleep(Duration),
    Signals {
        signals: NonEmpty<String>,
        timeout: Option<(Duration, TransitionKey)>,
    },
}

/// What an activity sees of its instance while one of its hooks runs.
///
/// Only [`Activity::execute`](crate::Activity::execute) may suspend the
/// instance; the suspension takes effect once the action returns, and the
/// key it returned is used when the instance resumes.
pub struct ActivityContext<'a> {
    instance_id: InstanceId,
    activity: &'a ActivityDef,
    variables: &'a mut BTreeMap<String, Value>,
    signals: &'a BTreeMap<String, Value>,
    can_suspend: bool,
    request: Option<SuspendRequest>,
}

impl<'a> ActivityContext<'a> {
    pub(crate) fn new(
        instance_id: InstanceId,
        activity: &'a ActivityDef,
        variables: &'a mut BTreeMap<String, Value>,
        signals: &'a BTreeMap<String, Value>,
        can_suspend: bool,
    ) -> Self {
        Self {
            instance_id,
            activity,
            variables,
            signals,
            can_suspend,
            request: None,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Name of the activity being run.
    pub fn activity_name(&self) -> &str {
        self.activity.name()
    }

    /// Definition of the activity being run.
    pub fn definition(&self) -> &ActivityDef {
        self.activity
    }

    /// The activity's default transition key.
    pub fn default_transition_key(&self) -> TransitionKey {
        self.activity.default_key().clone()
    }

    /// Suspend the instance for `duration` once the action returns.
    ///
    /// The worker is released while the instance sleeps.
    pub fn sleep(&mut self, duration: Duration) -> Result<()> {
        self.request(SuspendRequest::Sleep(duration))
    }

    pub fn sleep_ms(&mut self, millis: u64) -> Result<()> {
        self.sleep(Duration::from_millis(millis))
    }

    /// Suspend until every one of `signals` has been delivered.
    pub fn wait_for_signals(&mut self, signals: NonEmpty<String>) -> Result<()> {
        self.request(SuspendRequest::Signals {
            signals,
            timeout: None,
        })
    }

    /// Like [`wait_for_signals`](Self::wait_for_signals), but navigate with
    /// `timeout_key` if the signals have not all arrived after `timeout`.
    pub fn wait_for_signals_timeout(
        &mut self,
        signals: NonEmpty<String>,
        timeout: Duration,
        timeout_key: impl Into<TransitionKey>,
    ) -> Result<()> {
        self.request(SuspendRequest::Signals {
            signals,
            timeout: Some((timeout, timeout_key.into())),
        })
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        self.variables
    }

    /// Payload of a signal delivered to this instance.
    pub fn signal(&self, name: &str) -> Option<&Value> {
        self.signals.get(name)
    }

    pub(crate) fn take_request(&mut self) -> Option<SuspendRequest> {
        self.request.take()
    }

    fn request(&mut self, request: SuspendRequest) -> Result<()> {
        if !self.can_suspend {
            return Err(Error::Precondition(
                "an instance can only be suspended from an action",
            ));
        }
        if self.request.is_some() {
            return Err(Error::Precondition("the action already requested a suspension"));
        }
        self.request = Some(request);
        Ok(())
    }
}
