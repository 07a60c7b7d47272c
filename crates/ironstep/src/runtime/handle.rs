//! Weak back-reference from services to the runtime.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::host::RuntimeInner;
use crate::context::{ExecutionContext, InstanceId, InstanceStatus};
use crate::error::{Error, Result};

/// Handle given to every hosted service when the runtime is built.
///
/// It does not keep the runtime alive; once the runtime is dropped every
/// call fails with [`Error::Closed`].
///
/// # Example
///
/// ```ignore
/// impl PersistenceService for AuditedStore {
///     fn attach(&self, runtime: RuntimeHandle) {
///         self.runtime.set(runtime).ok();
///     }
///     // ...
/// }
/// ```
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
}

impl RuntimeHandle {
    pub(crate) fn new(inner: &Arc<RuntimeInner>) -> Self {
        Self {
            inner: Arc::downgrade(inner),
        }
    }

    fn upgrade(&self) -> Result<Arc<RuntimeInner>> {
        self.inner.upgrade().ok_or(Error::Closed)
    }

    /// Returns `true` while the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Current status of an instance held or finished by the runtime.
    pub fn status(&self, instance_id: InstanceId) -> Result<InstanceStatus> {
        self.upgrade()?.status(instance_id)
    }

    /// A copy of the instance's current context.
    pub async fn context(&self, instance_id: InstanceId) -> Result<ExecutionContext> {
        self.upgrade()?.context(instance_id).await
    }

    /// Set an instance variable.
    pub async fn set_variable(
        &self,
        instance_id: InstanceId,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.upgrade()?
            .set_variable(instance_id, name.into(), value.into())
            .await
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
