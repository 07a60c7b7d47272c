use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::PersistenceService;
use crate::context::{ExecutionContext, InstanceId};
use crate::error::{Error, Result};
use crate::runtime::RuntimeHandle;
use crate::sync::lock;

/// In-memory [`PersistenceService`].
///
/// Contexts are stored as JSON values, so every save and load goes through
/// the same serde round trip a real backend would. Clones share storage.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryStore::new();
/// let services = ServiceHost::new(JsonSchemeLoader::new(), store.clone());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    instances: Mutex<HashMap<InstanceId, Value>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
    runtime: OnceLock<RuntimeHandle>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail with a storage error (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Ids of every stored instance.
    pub fn list_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = lock(&self.inner.instances).keys().copied().collect();
        ids.sort();
        ids
    }

    /// The stored JSON document of an instance.
    pub fn raw(&self, instance_id: InstanceId) -> Option<Value> {
        lock(&self.inner.instances).get(&instance_id).cloned()
    }

    /// Remove an instance; returns `true` if it existed.
    pub fn remove(&self, instance_id: InstanceId) -> bool {
        lock(&self.inner.instances).remove(&instance_id).is_some()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// The runtime this store was attached to, if any.
    pub fn runtime(&self) -> Option<RuntimeHandle> {
        self.inner.runtime.get().cloned()
    }
}

#[async_trait]
impl PersistenceService for InMemoryStore {
    async fn load_instance_state(&self, instance_id: InstanceId) -> Result<ExecutionContext> {
        let value = self
            .raw(instance_id)
            .ok_or(Error::NotFound(instance_id))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn save_instance_state(&self, context: &ExecutionContext) -> Result<()> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::storage("in-memory store is rejecting saves"));
        }
        let value = serde_json::to_value(context)?;
        lock(&self.inner.instances).insert(context.instance_id(), value);
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        debug!(
            instance_id = %context.instance_id(),
            status = %context.status(),
            "Saved instance state"
        );
        Ok(())
    }

    fn attach(&self, runtime: RuntimeHandle) {
        let _ = self.inner.runtime.set(runtime);
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("instances", &lock(&self.inner.instances).len())
            .field("fail_saves", &self.inner.fail_saves.load(Ordering::SeqCst))
            .finish()
    }
}
