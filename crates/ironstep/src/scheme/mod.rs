//! The activity graph model.
//!
//! A [`Scheme`] is an immutable arena of [`ActivityDef`]s indexed by
//! [`ActivityId`]. Transitions are id-to-id edges and the children of a
//! composite activity occupy a contiguous id range, so the whole graph is
//! shared between instances through one `Arc<Scheme>` without parent/child
//! reference cycles.
//!
//! Schemes are built from an [`ActivityNode`] tree, either programmatically
//! or by a [`SchemeLoader`](crate::loader::SchemeLoader).

mod build;
mod render;

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::param::Expression;

pub use build::ActivityNode;

/// Symbolic name selecting the next activity after a step executes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionKey(String);

impl TransitionKey {
    /// Key used when an activity does not declare its own default.
    pub const DEFAULT: &'static str = "Default";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for TransitionKey {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransitionKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TransitionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for TransitionKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TransitionKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Stable index of an activity inside its scheme's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId(u32);

impl ActivityId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A sibling activity.
    Activity(ActivityId),
    /// The terminal point of the enclosing sub-graph.
    End,
}

/// One entry of an activity's transition mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub key: TransitionKey,
    pub target: Target,
}

/// A declared parameter and its parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDecl {
    pub name: String,
    /// The expression text as written in the source.
    pub source: String,
    pub expression: Expression,
}

/// An activity definition.
#[derive(Debug, Clone)]
pub struct ActivityDef {
    id: ActivityId,
    name: String,
    kind: String,
    path: String,
    parent: Option<ActivityId>,
    children: Range<usize>,
    start: Option<ActivityId>,
    transitions: Vec<Transition>,
    default_key: TransitionKey,
    parameters: Vec<ParameterDecl>,
}

impl ActivityDef {
    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// Identifier, unique within the scheme.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered kind implementing this activity's behavior.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Slash-separated names from the root, e.g. `Approval/Review`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<ActivityId> {
        self.parent
    }

    /// Start child of a composite activity.
    pub fn start(&self) -> Option<ActivityId> {
        self.start
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    /// An activity without transitions ends its sub-graph.
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Look up the target for `key`.
    pub fn target(&self, key: &TransitionKey) -> Option<Target> {
        self.transitions
            .iter()
            .find(|t| t.key == *key)
            .map(|t| t.target)
    }

    pub fn default_key(&self) -> &TransitionKey {
        &self.default_key
    }

    pub fn parameters(&self) -> &[ParameterDecl] {
        &self.parameters
    }

    /// Declarations as `(name, expression)` pairs.
    pub fn parameter_expressions(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), &p.expression))
    }
}

/// An auxiliary schema document passed along with a scheme URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliarySchema {
    pub name: String,
    pub content: String,
}

impl AuxiliarySchema {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A loaded, validated workflow graph.
#[derive(Debug, Clone)]
pub struct Scheme {
    name: String,
    uri: String,
    activities: Vec<ActivityDef>,
    by_name: HashMap<String, ActivityId>,
    auxiliary: Vec<AuxiliarySchema>,
}

impl Scheme {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The root activity.
    pub fn root(&self) -> &ActivityDef {
        &self.activities[0]
    }

    /// The activity with `id`.
    ///
    /// Ids handed out by this scheme are always valid.
    pub fn activity(&self, id: ActivityId) -> &ActivityDef {
        &self.activities[id.index()]
    }

    /// Find an activity by name.
    pub fn find(&self, name: &str) -> Option<&ActivityDef> {
        self.by_name.get(name).map(|id| self.activity(*id))
    }

    /// All activities in arena order (root first).
    pub fn activities(&self) -> &[ActivityDef] {
        &self.activities
    }

    /// Children of a composite activity; empty for leaves.
    pub fn children(&self, id: ActivityId) -> &[ActivityDef] {
        &self.activities[self.activity(id).children.clone()]
    }

    /// Ids from the root down to `id`, inclusive.
    pub fn path_to(&self, id: ActivityId) -> Vec<ActivityId> {
        let mut path = vec![id];
        let mut current = self.activity(id).parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.activity(parent).parent;
        }
        path.reverse();
        path
    }

    /// Map activity names from the root downwards to ids.
    ///
    /// Returns `None` unless every name exists and each is a child of the
    /// previous one.
    pub fn resolve_path(&self, names: &[String]) -> Option<Vec<ActivityId>> {
        let mut ids = Vec::with_capacity(names.len());
        let mut parent = None;
        for name in names {
            let def = self.find(name)?;
            if def.parent != parent {
                return None;
            }
            ids.push(def.id);
            parent = Some(def.id);
        }
        if ids.first().is_some_and(|root| *root != self.root().id) {
            return None;
        }
        Some(ids)
    }

    /// Auxiliary schema documents the scheme was loaded with.
    pub fn auxiliary_schemas(&self) -> &[AuxiliarySchema] {
        &self.auxiliary
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}
