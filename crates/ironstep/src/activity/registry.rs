//! Activity kind registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Activity, Flow, NamedActivity};
use crate::error::{Error, Result};
use crate::scheme::ActivityDef;

/// Creates the activity object for an entered activity.
pub type ActivityFactory = Arc<dyn Fn(&ActivityDef) -> Box<dyn Activity> + Send + Sync>;

/// Maps activity kinds to factories.
///
/// The built-in `flow` composite kind is always present. Duplicate
/// registrations are remembered and reported by [`check`](Self::check) so
/// builder chains stay infallible.
#[derive(Clone)]
pub struct ActivityRegistry {
    factories: HashMap<String, ActivityFactory>,
    duplicate: Option<String>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            duplicate: None,
        };
        registry.register::<Flow>();
        registry
    }

    /// Register `A` under [`NamedActivity::KIND`].
    pub fn register<A: NamedActivity>(&mut self) -> &mut Self {
        self.register_with(A::KIND, |_| Box::new(A::default()) as Box<dyn Activity>)
    }

    /// Register a custom factory for `kind`.
    pub fn register_with<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ActivityDef) -> Box<dyn Activity> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            if self.duplicate.is_none() {
                self.duplicate = Some(kind);
            }
            return self;
        }
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    /// Fail if any kind was registered twice.
    pub fn check(&self) -> Result<()> {
        match &self.duplicate {
            Some(kind) => Err(Error::DuplicateActivityKind(kind.clone())),
            None => Ok(()),
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Create the activity object for `def`.
    pub fn create(&self, def: &ActivityDef) -> Result<Box<dyn Activity>> {
        let factory = self
            .factories
            .get(def.kind())
            .ok_or_else(|| Error::UnknownActivityKind(def.kind().to_owned()))?;
        Ok(factory(def))
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
