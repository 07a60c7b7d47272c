//! Activity behavior and its registration.
//!
//! A scheme only names activity *kinds*; the behavior behind a kind is an
//! [`Activity`] implementation registered with the runtime. Every instance
//! gets its own activity objects, created from the registered factory when
//! the activity is entered.
//!
//! # Example
//!
//! ```ignore
//! use ironstep::{Activity, ActivityContext, NamedActivity, Parameters, Properties, Result, TransitionKey};
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
//!     ) -> Result<TransitionKey> {
//!         self.approver = params.get("Approver")?;
//!         ctx.wait_for_signals(nonempty::nonempty!["approved".to_string()])?;
//!         Ok("Approved".into())
//!     }
//! }
//!
//! impl NamedActivity for Review {
//!     const KIND: &'static str = "review";
//! }
//! ```

mod registry;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ActivityContext;
use crate::error::Result;
use crate::param::{Parameters, Properties};
use crate::scheme::TransitionKey;

pub use registry::{ActivityFactory, ActivityRegistry};

/// Behavior of one activity kind.
///
/// The engine calls [`initialize`](Self::initialize) once when the activity
/// is entered and [`uninitialize`](Self::uninitialize) once when control
/// leaves it, whatever the reason. Composite activities are entered and left
/// the same way, but their `execute` is never called: control passes to
/// their start child instead.
#[async_trait]
pub trait Activity: Properties + Send + Sync + 'static {
    async fn initialize(&mut self, _ctx: &mut ActivityContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Run the action and pick the transition to take.
    ///
    /// Parameters are resolved right before each call. Calling
    /// [`ActivityContext::sleep`] or one of the signal waits suspends the
    /// instance after this returns; the returned key is kept until it
    /// resumes.
    async fn execute(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        _params: &Parameters,
    ) -> Result<TransitionKey> {
        Ok(ctx.default_transition_key())
    }

    async fn uninitialize(&mut self, _ctx: &mut ActivityContext<'_>) -> Result<()> {
        Ok(())
    }

    /// State to persist with the instance.
    fn snapshot(&self) -> Option<Value> {
        None
    }

    /// Restore state saved by [`snapshot`](Self::snapshot).
    ///
    /// Called on a fresh object instead of `initialize` when a suspended
    /// instance is loaded back from persistence.
    fn restore(&mut self, _state: Value) -> Result<()> {
        Ok(())
    }
}

/// An activity registered under a fixed kind name.
pub trait NamedActivity: Activity + Default {
    /// Kind name used in schemes. Must be stable across deployments.
    const KIND: &'static str;
}

/// Built-in composite kind with no behavior of its own.
#[derive(Debug, Default)]
pub struct Flow;

impl Properties for Flow {}

impl Activity for Flow {}

impl NamedActivity for Flow {
    const KIND: &'static str = "flow";
}
