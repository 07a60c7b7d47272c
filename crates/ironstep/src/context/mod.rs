//! Durable per-instance state.
//!
//! An [`ExecutionContext`] is everything the runtime needs to continue an
//! instance after a restart: where execution stands in the graph, why it is
//! suspended, the instance variables and the snapshots of live activity
//! objects. Persistence services store it as an opaque serde value.

mod activity;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::scheme::TransitionKey;

pub use activity::ActivityContext;
pub(crate) use activity::SuspendRequest;

/// Identifier of a workflow instance.
///
/// Generated as a UUID v7 so ids sort by creation time.
///
/// # Example
///
/// ```
/// use ironstep::InstanceId;
///
/// let id = InstanceId::new();
/// let parsed: InstanceId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Created,
    Running,
    Sleeping,
    WaitingExternal,
    Completed,
    Faulted,
    Cancelled,
}

impl InstanceStatus {
    /// Returns `true` once the instance can make no further progress.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            InstanceStatus::Completed | InstanceStatus::Faulted | InstanceStatus::Cancelled
        )
    }

    /// Returns `true` while the instance waits for a timer or signal.
    pub fn is_suspended(self) -> bool {
        matches!(self, InstanceStatus::Sleeping | InstanceStatus::WaitingExternal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Created => "created",
            InstanceStatus::Running => "running",
            InstanceStatus::Sleeping => "sleeping",
            InstanceStatus::WaitingExternal => "waiting_external",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Faulted => "faulted",
            InstanceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a suspended instance is not executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Suspension {
    /// Waiting for a timer.
    Sleeping { until: OffsetDateTime },
    /// Waiting for every one of `signals` to be delivered.
    WaitingExternal {
        signals: Vec<String>,
        /// Payloads of the signals delivered so far.
        received: BTreeMap<String, Value>,
        /// When the wait gives up, if bounded.
        deadline: Option<OffsetDateTime>,
        /// Key to navigate with when the deadline passes.
        timeout_key: Option<TransitionKey>,
    },
}

impl Suspension {
    /// Returns `true` once every awaited signal has been delivered.
    pub fn all_received(&self) -> bool {
        match self {
            Suspension::Sleeping { .. } => false,
            Suspension::WaitingExternal { signals, received, .. } => {
                signals.iter().all(|s| received.contains_key(s))
            }
        }
    }
}

/// Fault details kept with a faulted instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInfo {
    /// Activity that was executing, if any.
    pub activity: Option<String>,
    /// Short error kind, e.g. `navigation`.
    pub kind: String,
    pub message: String,
}

/// Durable state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    instance_id: InstanceId,
    scheme_uri: String,
    scheme_name: String,
    status: InstanceStatus,
    /// Names from the root down to the current leaf.
    active_path: Vec<String>,
    pending_key: Option<TransitionKey>,
    suspension: Option<Suspension>,
    variables: BTreeMap<String, Value>,
    /// Latest payload of every signal delivered to the instance.
    signals: BTreeMap<String, Value>,
    /// Signals delivered before a wait asked for them.
    #[serde(default)]
    buffered_signals: BTreeMap<String, Value>,
    activity_state: BTreeMap<String, Value>,
    fault: Option<FaultInfo>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl ExecutionContext {
    /// Create the context of a new instance in `Created` status.
    pub fn new(
        instance_id: InstanceId,
        scheme_uri: impl Into<String>,
        scheme_name: impl Into<String>,
        variables: BTreeMap<String, Value>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            instance_id,
            scheme_uri: scheme_uri.into(),
            scheme_name: scheme_name.into(),
            status: InstanceStatus::Created,
            active_path: Vec::new(),
            pending_key: None,
            suspension: None,
            variables,
            signals: BTreeMap::new(),
            buffered_signals: BTreeMap::new(),
            activity_state: BTreeMap::new(),
            fault: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn scheme_uri(&self) -> &str {
        &self.scheme_uri
    }

    pub fn scheme_name(&self) -> &str {
        &self.scheme_name
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Activity names from the root down to the current leaf.
    pub fn active_path(&self) -> &[String] {
        &self.active_path
    }

    /// The innermost active activity.
    pub fn current_activity(&self) -> Option<&str> {
        self.active_path.last().map(String::as_str)
    }

    /// Key recorded by the last action before suspending.
    pub fn pending_key(&self) -> Option<&TransitionKey> {
        self.pending_key.as_ref()
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        self.suspension.as_ref()
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Set an instance variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
        self.touch();
    }

    /// Payloads of delivered signals.
    pub fn signals(&self) -> &BTreeMap<String, Value> {
        &self.signals
    }

    /// Signals delivered before the instance waited for them.
    pub fn buffered_signals(&self) -> &BTreeMap<String, Value> {
        &self.buffered_signals
    }

    /// Snapshot of an activity object's state, if it produced one.
    pub fn activity_state(&self, activity: &str) -> Option<&Value> {
        self.activity_state.get(activity)
    }

    pub fn fault(&self) -> Option<&FaultInfo> {
        self.fault.as_ref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub(crate) fn set_status(&mut self, status: InstanceStatus) {
        self.status = status;
        self.touch();
    }

    pub(crate) fn active_path_mut(&mut self) -> &mut Vec<String> {
        &mut self.active_path
    }

    pub(crate) fn set_pending(&mut self, key: Option<TransitionKey>, suspension: Option<Suspension>) {
        self.pending_key = key;
        self.suspension = suspension;
        self.touch();
    }

    pub(crate) fn suspension_mut(&mut self) -> Option<&mut Suspension> {
        self.suspension.as_mut()
    }

    pub(crate) fn take_suspension(&mut self) -> (Option<TransitionKey>, Option<Suspension>) {
        (self.pending_key.take(), self.suspension.take())
    }

    pub(crate) fn signals_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.signals
    }

    /// Hold a signal until a wait asks for it. A later payload replaces an
    /// earlier one.
    pub(crate) fn buffer_signal(&mut self, name: impl Into<String>, payload: Value) {
        self.buffered_signals.insert(name.into(), payload);
        self.touch();
    }

    /// Remove and return the buffered signals named in `signals`.
    pub(crate) fn take_buffered_signals(&mut self, signals: &[String]) -> BTreeMap<String, Value> {
        signals
            .iter()
            .filter_map(|name| self.buffered_signals.remove_entry(name.as_str()))
            .collect()
    }

    /// Split borrow used to build an [`ActivityContext`].
    pub(crate) fn activity_parts(
        &mut self,
    ) -> (&mut BTreeMap<String, Value>, &BTreeMap<String, Value>) {
        (&mut self.variables, &self.signals)
    }

    pub(crate) fn clear_activity_states(&mut self) {
        self.activity_state.clear();
    }

    pub(crate) fn set_activity_state(&mut self, activity: &str, state: Option<Value>) {
        match state {
            Some(state) => self.activity_state.insert(activity.to_owned(), state),
            None => self.activity_state.remove(activity),
        };
    }

    pub(crate) fn set_fault(&mut self, fault: FaultInfo) {
        self.fault = Some(fault);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}
