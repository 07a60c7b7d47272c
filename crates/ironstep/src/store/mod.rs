//! Persistence contract for instance state.
//!
//! The engine only ever loads and saves whole [`ExecutionContext`]s; how they
//! are stored is up to the [`PersistenceService`] implementation. Saves are
//! not transactional with engine steps: the in-memory context stays
//! authoritative and a failed save can simply be repeated.
//!
//! - [`InMemoryStore`] — reference implementation keeping JSON copies in memory

mod memory;

use async_trait::async_trait;

pub use memory::InMemoryStore;

use crate::context::{ExecutionContext, InstanceId};
use crate::error::Result;
use crate::runtime::RuntimeHandle;

/// Storage backend for instance state.
///
/// # Implementations
///
/// - [`InMemoryStore`] — process-local, for tests and embedding
#[async_trait]
pub trait PersistenceService: Send + Sync + 'static {
    /// Load the last saved state of an instance.
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) for unknown ids.
    async fn load_instance_state(&self, instance_id: InstanceId) -> Result<ExecutionContext>;

    /// Save the state of an instance, replacing any earlier copy.
    ///
    /// Must be idempotent; the last write wins. Backend failures are
    /// reported as [`Error::Storage`](crate::Error::Storage).
    async fn save_instance_state(&self, context: &ExecutionContext) -> Result<()>;

    /// Called once when the runtime owning this service is built.
    fn attach(&self, _runtime: RuntimeHandle) {}
}
