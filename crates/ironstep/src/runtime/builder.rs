//! Runtime builder.

use std::sync::Arc;

use tracing::debug;

use super::config::RuntimeConfig;
use super::handle::RuntimeHandle;
use super::host::{RuntimeInner, WorkflowRuntime};
use crate::activity::{Activity, ActivityRegistry, NamedActivity};
use crate::error::Result;
use crate::scheme::{ActivityDef, AuxiliarySchema};
use crate::service::ServiceHost;

/// Builder for constructing a [`WorkflowRuntime`].
///
/// Use this to register activity kinds and configure the runtime before
/// starting.
///
/// # Example
///
/// ```ignore
/// let runtime = WorkflowRuntime::builder(ServiceHost::new(loader, store))
///     .register::<Review>()
///     .register::<Notify>()
///     .config(RuntimeConfig {
///         worker_count: 8,
///         ..Default::default()
///     })
///     .build()?;
/// ```
pub struct WorkflowBuilder {
    services: ServiceHost,
    activities: ActivityRegistry,
    auxiliary: Vec<AuxiliarySchema>,
    config: RuntimeConfig,
}

impl WorkflowBuilder {
    pub(crate) fn new(services: ServiceHost) -> Self {
        Self {
            services,
            activities: ActivityRegistry::new(),
            auxiliary: Vec::new(),
            config: RuntimeConfig::default(),
        }
    }

    /// Register an activity type under its [`NamedActivity::KIND`].
    ///
    /// Each kind can only be registered once. Duplicate checks are deferred
    /// until build time.
    pub fn register<A: NamedActivity>(mut self) -> Self {
        self.activities.register::<A>();
        self
    }

    /// Register a factory for `kind`.
    ///
    /// The factory sees the definition of the activity being entered, so one
    /// kind can create differently configured objects.
    pub fn register_with<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ActivityDef) -> Box<dyn Activity> + Send + Sync + 'static,
    {
        self.activities.register_with(kind, factory);
        self
    }

    /// Add an auxiliary schema passed to the scheme loader with every load.
    pub fn auxiliary_schema(mut self, schema: AuxiliarySchema) -> Self {
        self.auxiliary.push(schema);
        self
    }

    /// Set the runtime configuration.
    ///
    /// If not called, uses [`RuntimeConfig::default()`].
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the runtime.
    ///
    /// Fails on a duplicate activity kind or a missing service. Every hosted
    /// service receives a [`RuntimeHandle`] before this returns.
    pub fn build(self) -> Result<WorkflowRuntime> {
        self.activities.check()?;
        self.services.check()?;

        let worker_id = self
            .config
            .worker_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let inner = Arc::new(RuntimeInner::new(
            self.config,
            worker_id,
            self.services.clone(),
            self.activities,
            self.auxiliary,
        ));
        self.services.attach(&RuntimeHandle::new(&inner));

        debug!(worker_id = %inner.worker_id, services = ?self.services, "Runtime built");
        Ok(WorkflowRuntime { inner })
    }
}
