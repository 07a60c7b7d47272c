//! Construction and validation of schemes from activity trees.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use super::{
    ActivityDef, ActivityId, AuxiliarySchema, ParameterDecl, Scheme, Target, Transition,
    TransitionKey,
};
use crate::error::{Error, Result, SourceLocation};
use crate::param::Expression;

/// Source form of one activity and its sub-graph.
///
/// This is also the JSON document shape read by
/// [`JsonSchemeLoader`](crate::loader::JsonSchemeLoader):
///
/// ```json
/// {
///   "id": "Approval",
///   "kind": "flow",
///   "start": "Review",
///   "children": [
///     { "id": "Review", "kind": "review",
///       "parameters": { "Approver": "@Root.Owner" },
///       "transitions": { "Approved": "Notify", "Rejected": null } },
///     { "id": "Notify", "kind": "notify" }
///   ]
/// }
/// ```
///
/// A `null` target is the end of the enclosing sub-graph. `next` is
/// shorthand for a transition under the default key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityNode {
    id: String,
    kind: String,
    #[serde(default, deserialize_with = "ordered_pairs")]
    parameters: Vec<(String, String)>,
    #[serde(default, deserialize_with = "ordered_pairs")]
    transitions: Vec<(String, Option<String>)>,
    #[serde(default, deserialize_with = "present")]
    next: Option<Option<String>>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    children: Vec<ActivityNode>,
}

impl ActivityNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parameters: Vec::new(),
            transitions: Vec::new(),
            next: None,
            default: None,
            start: None,
            children: Vec::new(),
        }
    }

    /// Declare a parameter expression.
    pub fn param(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.parameters.push((name.into(), expression.into()));
        self
    }

    /// Map `key` to the sibling `target`.
    pub fn transition(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.transitions.push((key.into(), Some(target.into())));
        self
    }

    /// Map `key` to the end of the enclosing sub-graph.
    pub fn transition_to_end(mut self, key: impl Into<String>) -> Self {
        self.transitions.push((key.into(), None));
        self
    }

    /// Continue with `target` under the default key.
    pub fn next(mut self, target: impl Into<String>) -> Self {
        self.next = Some(Some(target.into()));
        self
    }

    /// Override the default transition key.
    pub fn default_key(mut self, key: impl Into<String>) -> Self {
        self.default = Some(key.into());
        self
    }

    /// Set the start child of a composite.
    pub fn start(mut self, child: impl Into<String>) -> Self {
        self.start = Some(child.into());
        self
    }

    /// Add a child activity.
    pub fn child(mut self, child: ActivityNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Children of this node.
    pub fn children(&self) -> &[ActivityNode] {
        &self.children
    }

    /// Declared parameter names.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(n, _)| n.as_str())
    }

    /// Keys of every declared transition, including `next`.
    pub fn transition_keys(&self) -> impl Iterator<Item = &str> {
        let next = self
            .next
            .as_ref()
            .map(|_| self.default.as_deref().unwrap_or(TransitionKey::DEFAULT));
        self.transitions.iter().map(|(k, _)| k.as_str()).chain(next)
    }
}

struct Pending<'a> {
    node: &'a ActivityNode,
    path: String,
    parent: Option<ActivityId>,
    children: std::ops::Range<usize>,
}

impl Scheme {
    /// Validate an activity tree and lay it out as an arena.
    ///
    /// Ids are allocated breadth first so the children of every composite
    /// form a contiguous range. Fails with [`Error::SchemeParse`] carrying
    /// the path of the offending activity.
    pub fn build(
        name: impl Into<String>,
        uri: impl Into<String>,
        root: &ActivityNode,
        auxiliary: Vec<AuxiliarySchema>,
    ) -> Result<Scheme> {
        let uri = uri.into();
        let invalid = |path: &str, message: String| {
            Error::scheme(uri.clone(), SourceLocation::Activity(path.to_owned()), message)
        };

        if !root.transitions.is_empty() || root.next.is_some() {
            return Err(invalid(&root.id, "the root activity cannot have transitions".into()));
        }

        let mut pending: Vec<Pending<'_>> = Vec::new();
        let mut queue = VecDeque::from([(root, root.id.clone(), None)]);
        let mut next_free = 1usize;
        while let Some((node, path, parent)) = queue.pop_front() {
            let id = ActivityId::from_index(pending.len());
            let children = next_free..next_free + node.children.len();
            next_free = children.end;
            for child in &node.children {
                queue.push_back((child, format!("{path}/{}", child.id), Some(id)));
            }
            pending.push(Pending {
                node,
                path,
                parent,
                children,
            });
        }

        let mut by_name = HashMap::with_capacity(pending.len());
        for (index, entry) in pending.iter().enumerate() {
            let node = entry.node;
            if node.id.trim().is_empty() {
                return Err(invalid(&entry.path, "activity id cannot be empty".into()));
            }
            if node.kind.trim().is_empty() {
                return Err(invalid(&entry.path, "activity kind cannot be empty".into()));
            }
            if by_name
                .insert(node.id.clone(), ActivityId::from_index(index))
                .is_some()
            {
                return Err(invalid(
                    &entry.path,
                    format!("duplicate activity id `{}`", node.id),
                ));
            }
        }

        let sibling = |entry: &Pending<'_>, name: &str| -> Option<ActivityId> {
            let id = *by_name.get(name)?;
            (pending[id.index()].parent == entry.parent).then_some(id)
        };

        let mut activities = Vec::with_capacity(pending.len());
        for (index, entry) in pending.iter().enumerate() {
            let node = entry.node;
            let id = ActivityId::from_index(index);

            let start = match (&node.start, node.children.is_empty()) {
                (None, true) => None,
                (Some(_), true) => {
                    return Err(invalid(&entry.path, "only composite activities have a start".into()));
                }
                (None, false) => {
                    return Err(invalid(&entry.path, "composite activity needs a start child".into()));
                }
                (Some(start), false) => {
                    let start_id = by_name
                        .get(start)
                        .copied()
                        .filter(|child| pending[child.index()].parent == Some(id))
                        .ok_or_else(|| {
                            invalid(&entry.path, format!("start `{start}` is not a child"))
                        })?;
                    Some(start_id)
                }
            };

            let default_key = node
                .default
                .as_deref()
                .map(TransitionKey::from)
                .unwrap_or_default();
            if default_key.as_str().is_empty() {
                return Err(invalid(&entry.path, "default key cannot be empty".into()));
            }

            let mut declared: Vec<(TransitionKey, Option<&String>)> = node
                .transitions
                .iter()
                .map(|(key, target)| (TransitionKey::from(key.as_str()), target.as_ref()))
                .collect();
            if let Some(next) = &node.next {
                declared.push((default_key.clone(), next.as_ref()));
            }

            let mut seen = HashSet::new();
            let mut transitions = Vec::with_capacity(declared.len());
            for (key, target) in declared {
                if key.as_str().is_empty() {
                    return Err(invalid(&entry.path, "transition key cannot be empty".into()));
                }
                if !seen.insert(key.clone()) {
                    return Err(invalid(&entry.path, format!("transition `{key}` declared twice")));
                }
                let target = match target {
                    None => Target::End,
                    Some(name) => Target::Activity(sibling(entry, name).ok_or_else(|| {
                        invalid(
                            &entry.path,
                            format!("transition `{key}` targets `{name}`, which is not a sibling"),
                        )
                    })?),
                };
                transitions.push(Transition { key, target });
            }

            let mut names = HashSet::new();
            let mut parameters = Vec::with_capacity(node.parameters.len());
            for (name, source) in &node.parameters {
                if !names.insert(name.as_str()) {
                    return Err(invalid(&entry.path, format!("parameter `{name}` declared twice")));
                }
                let expression = Expression::parse(source).map_err(|reason| {
                    invalid(&entry.path, format!("parameter `{name}`: {reason}"))
                })?;
                parameters.push(ParameterDecl {
                    name: name.clone(),
                    source: source.clone(),
                    expression,
                });
            }

            activities.push(ActivityDef {
                id,
                name: node.id.clone(),
                kind: node.kind.clone(),
                path: entry.path.clone(),
                parent: entry.parent,
                children: entry.children.clone(),
                start,
                transitions,
                default_key,
                parameters,
            });
        }

        Ok(Scheme {
            name: name.into(),
            uri,
            activities,
            by_name,
            auxiliary,
        })
    }
}

/// Deserialize a JSON object into pairs, keeping document order.
fn ordered_pairs<'de, D, V>(deserializer: D) -> std::result::Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct PairsVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for PairsVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object")
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut map: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(pair) = map.next_entry()? {
                pairs.push(pair);
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor(PhantomData))
}

/// Distinguish an explicit `null` from a missing field.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
