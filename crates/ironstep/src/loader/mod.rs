//! Scheme loading contract.
//!
//! A [`SchemeLoader`] turns a scheme URI plus optional auxiliary schema
//! documents into a validated [`Scheme`]. The runtime caches loaded schemes
//! per URI and shares them between instances.

mod json;

use std::sync::Arc;

use async_trait::async_trait;

pub use json::JsonSchemeLoader;

use crate::error::Result;
use crate::runtime::RuntimeHandle;
use crate::scheme::{AuxiliarySchema, Scheme};

/// Produces schemes from URIs.
#[async_trait]
pub trait SchemeLoader: Send + Sync + 'static {
    /// Load and validate the scheme at `scheme_uri`.
    ///
    /// Fails with [`Error::Precondition`](crate::Error::Precondition) for an
    /// empty URI and [`Error::SchemeParse`](crate::Error::SchemeParse) for
    /// malformed or invalid definitions.
    async fn create_instance(
        &self,
        scheme_uri: &str,
        auxiliary_schemas: &[AuxiliarySchema],
    ) -> Result<Arc<Scheme>>;

    /// Called once when the runtime owning this loader is built.
    fn attach(&self, _runtime: RuntimeHandle) {}
}
