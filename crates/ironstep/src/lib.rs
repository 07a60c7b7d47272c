//! Durable activity-graph workflow runtime.
//!
//! Ironstep executes instances of a declaratively defined activity graph:
//!
//! - **Schemes** — a tree of activities whose transitions are keyed by the
//!   value each action returns; composite activities nest sub-graphs
//! - **Parameter expressions** — literals, lists and `@Property` references
//!   resolved against the executing or root activity before every action
//! - **Suspension** — actions can sleep or wait for external signals without
//!   occupying a worker
//! - **Persistence** — instance state is saved after every step and can be
//!   restored after a restart
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           WorkflowRuntime                               │
//! │                                                                         │
//! │   1. SchemeLoader: URI + auxiliary schemas → Scheme                     │
//! │   2. Queue Start/Wake/Timeout items to the worker pool                  │
//! │   3. Worker locks the instance and advances it:                         │
//! │        resolve parameters → execute → navigate by transition key        │
//! │   4. PersistenceService saves the ExecutionContext                      │
//! │   5. Suspended instances park on a timer or their awaited signals       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ironstep::{
//!     Activity, ActivityContext, InMemoryStore, JsonSchemeLoader, NamedActivity, Parameters,
//!     Properties, ServiceHost, TransitionKey, WorkflowRuntime,
//! };
//!
//! #[derive(Default, Properties)]
//! struct Review {
//!     approver: String,
//! }
//!
//! #[async_trait::async_trait]
//! impl Activity for Review {
//!     async fn execute(
//!         &mut self,
//!         ctx: &mut ActivityContext<'_>,
//!         params: &Parameters,
//!     ) -> ironstep::Result<TransitionKey> {
//!         self.approver = params.get("Approver")?;
//!         ctx.sleep_ms(500)?;
//!         Ok("Approved".into())
//!     }
//! }
//!
//! impl NamedActivity for Review {
//!     const KIND: &'static str = "review";
//! }
//!
//! let runtime = WorkflowRuntime::builder(ServiceHost::new(JsonSchemeLoader::new(), InMemoryStore::new()))
//!     .register::<Review>()
//!     .build()?;
//!
//! tokio::spawn(runtime.clone().run(shutdown_signal));
//! let id = runtime.start_instance("schemes/approval.json", Default::default()).await?;
//! ```
//!
//! # Design Documentation
//!
//! See `DESIGN.md` for architectural decisions.

// Allow the crate to reference itself as `ironstep` for macro-generated code
extern crate self as ironstep;

pub mod activity;
pub mod context;
mod engine;
mod error;
pub mod loader;
pub mod param;
pub mod runtime;
pub mod scheme;
mod service;
pub mod store;
pub mod sync;

pub use activity::{Activity, ActivityFactory, ActivityRegistry, Flow, NamedActivity};
pub use context::{
    ActivityContext, ExecutionContext, FaultInfo, InstanceId, InstanceStatus, Suspension,
};
pub use error::{BoxError, Error, Result, SourceLocation};
pub use loader::{JsonSchemeLoader, SchemeLoader};
pub use nonempty::NonEmpty;
pub use param::{FromParam, ParamEnum, ParamValue, Parameters, Properties, SharedList, ToParam};
pub use runtime::{RuntimeConfig, RuntimeHandle, WorkflowBuilder, WorkflowRuntime};
pub use scheme::{ActivityDef, ActivityId, ActivityNode, AuxiliarySchema, Scheme, TransitionKey};
pub use service::{ServiceHost, ServiceKind};
pub use store::{InMemoryStore, PersistenceService};

// Re-export derive macros
pub use ironstep_macros::{ParamEnum, Properties};
