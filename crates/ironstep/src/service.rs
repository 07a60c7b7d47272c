//! Services the runtime depends on.
//!
//! A [`ServiceHost`] is handed to [`WorkflowRuntime::builder`] and lives as
//! long as that runtime; there is no process-wide registry. When the runtime
//! is built, every service is attached to it through a [`RuntimeHandle`].
//!
//! [`WorkflowRuntime::builder`]: crate::WorkflowRuntime::builder

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::loader::SchemeLoader;
use crate::runtime::RuntimeHandle;
use crate::store::PersistenceService;

/// The kinds of service a runtime hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    SchemeLoader,
    Persistence,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceKind::SchemeLoader => "scheme loader",
            ServiceKind::Persistence => "persistence",
        })
    }
}

#[derive(Clone)]
enum Service {
    SchemeLoader(Arc<dyn SchemeLoader>),
    Persistence(Arc<dyn PersistenceService>),
}

/// Services keyed by [`ServiceKind`].
///
/// # Example
///
/// ```ignore
/// let services = ServiceHost::new(JsonSchemeLoader::new(), InMemoryStore::new());
/// let runtime = WorkflowRuntime::builder(services).build()?;
/// ```
#[derive(Clone, Default)]
pub struct ServiceHost {
    services: HashMap<ServiceKind, Service>,
}

impl ServiceHost {
    /// Host a scheme loader and a persistence service.
    pub fn new(loader: impl SchemeLoader, persistence: impl PersistenceService) -> Self {
        Self::empty()
            .with_scheme_loader(loader)
            .with_persistence(persistence)
    }

    /// A host without services; the runtime build fails until both are set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_scheme_loader(mut self, loader: impl SchemeLoader) -> Self {
        self.services
            .insert(ServiceKind::SchemeLoader, Service::SchemeLoader(Arc::new(loader)));
        self
    }

    pub fn with_persistence(mut self, persistence: impl PersistenceService) -> Self {
        self.services.insert(
            ServiceKind::Persistence,
            Service::Persistence(Arc::new(persistence)),
        );
        self
    }

    /// The hosted scheme loader.
    pub fn scheme_loader(&self) -> Result<&Arc<dyn SchemeLoader>> {
        match self.services.get(&ServiceKind::SchemeLoader) {
            Some(Service::SchemeLoader(loader)) => Ok(loader),
            _ => Err(Error::MissingService(ServiceKind::SchemeLoader)),
        }
    }

    /// The hosted persistence service.
    pub fn persistence(&self) -> Result<&Arc<dyn PersistenceService>> {
        match self.services.get(&ServiceKind::Persistence) {
            Some(Service::Persistence(persistence)) => Ok(persistence),
            _ => Err(Error::MissingService(ServiceKind::Persistence)),
        }
    }

    pub fn contains(&self, kind: ServiceKind) -> bool {
        self.services.contains_key(&kind)
    }

    /// Fail unless every service kind is present.
    pub(crate) fn check(&self) -> Result<()> {
        self.scheme_loader()?;
        self.persistence()?;
        Ok(())
    }

    pub(crate) fn attach(&self, runtime: &RuntimeHandle) {
        for service in self.services.values() {
            match service {
                Service::SchemeLoader(loader) => loader.attach(runtime.clone()),
                Service::Persistence(persistence) => persistence.attach(runtime.clone()),
            }
        }
    }
}

impl fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.services.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("ServiceHost").field("services", &kinds).finish()
    }
}
