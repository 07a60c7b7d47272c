//! Runtime for executing workflow instances.
//!
//! - [`WorkflowRuntime`] — owns services, loaded schemes, the dispatch queue
//!   and the worker pool; the API for starting and steering instances
//! - [`WorkflowBuilder`] — registers activity kinds and configures the runtime
//! - [`RuntimeConfig`] — worker count, queue and shutdown settings
//! - [`RuntimeHandle`] — weak back-reference handed to services
//!
//! Work items (`start` and `resume`) flow through one [`GuardedQueue`] to
//! the workers. Each instance sits behind its own async mutex, so at most
//! one worker advances it at a time. Sleeping and waiting instances are
//! parked on a composite wait outside the worker pool and re-enqueued when
//! their timer fires or their signals arrive.
//!
//! # Example
//!
//! ```ignore
//! use ironstep::{InMemoryStore, JsonSchemeLoader, ServiceHost, WorkflowRuntime};
//!
//! let runtime = WorkflowRuntime::builder(ServiceHost::new(JsonSchemeLoader::new(), InMemoryStore::new()))
//!     .register::<Review>()
//!     .register::<Notify>()
//!     .build()?;
//!
//! tokio::spawn(runtime.clone().run(shutdown_signal));
//! let id = runtime.start_instance("file:///etc/schemes/approval.json", Default::default()).await?;
//! ```
//!
//! [`GuardedQueue`]: crate::sync::GuardedQueue

mod builder;
mod config;
mod handle;
mod host;
mod slot;
mod worker;

pub use builder::WorkflowBuilder;
pub use config::RuntimeConfig;
pub use handle::RuntimeHandle;
pub use host::WorkflowRuntime;

use crate::context::InstanceId;
use crate::engine::Resume;

/// A unit of work for the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkItem {
    pub(crate) instance_id: InstanceId,
    pub(crate) resume: Resume,
}

impl WorkItem {
    pub(crate) fn new(instance_id: InstanceId, resume: Resume) -> Self {
        Self {
            instance_id,
            resume,
        }
    }
}
