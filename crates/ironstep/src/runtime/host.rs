//! The workflow runtime and its shared state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::builder::WorkflowBuilder;
use super::config::RuntimeConfig;
use super::slot::{InstanceSlot, Parking};
use super::worker::Worker;
use super::WorkItem;
use crate::activity::ActivityRegistry;
use crate::context::{ExecutionContext, InstanceId, InstanceStatus, Suspension};
use crate::engine::{InstanceRun, Resume, Step};
use crate::error::{Error, Result, SourceLocation};
use crate::scheme::{AuxiliarySchema, Scheme};
use crate::service::ServiceHost;
use crate::sync::{GuardedQueue, lock};

/// What remains of an instance once it finished and its final state was
/// saved.
#[derive(Debug, Clone)]
struct Finished {
    status: InstanceStatus,
    fault: Option<Arc<Error>>,
}

/// State shared by the runtime, its workers, parked tasks and handles.
pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) worker_id: String,
    services: ServiceHost,
    activities: ActivityRegistry,
    auxiliary: Vec<AuxiliarySchema>,
    schemes: tokio::sync::Mutex<HashMap<String, Arc<Scheme>>>,
    pub(crate) queue: GuardedQueue<WorkItem>,
    instances: Mutex<HashMap<InstanceId, Arc<InstanceSlot>>>,
    finished: Mutex<HashMap<InstanceId, Finished>>,
}

impl RuntimeInner {
    pub(crate) fn new(
        config: RuntimeConfig,
        worker_id: String,
        services: ServiceHost,
        activities: ActivityRegistry,
        auxiliary: Vec<AuxiliarySchema>,
    ) -> Self {
        let queue = match config.queue_capacity {
            Some(capacity) => GuardedQueue::bounded(capacity),
            None => GuardedQueue::unbounded(),
        };
        Self {
            config,
            worker_id,
            services,
            activities,
            auxiliary,
            schemes: tokio::sync::Mutex::new(HashMap::new()),
            queue,
            instances: Mutex::new(HashMap::new()),
            finished: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn slot(&self, instance_id: InstanceId) -> Option<Arc<InstanceSlot>> {
        lock(&self.instances).get(&instance_id).cloned()
    }

    fn insert(&self, slot: Arc<InstanceSlot>, instance_id: InstanceId) {
        lock(&self.instances).insert(instance_id, slot);
    }

    fn remove(&self, instance_id: InstanceId) -> Option<Arc<InstanceSlot>> {
        lock(&self.instances).remove(&instance_id)
    }

    fn finished(&self, instance_id: InstanceId) -> Option<Finished> {
        lock(&self.finished).get(&instance_id).cloned()
    }

    /// Drop a finished, saved instance from memory, keeping its outcome,
    /// then publish its final status.
    fn release(&self, slot: &InstanceSlot, status: InstanceStatus) {
        let instance_id = slot.id();
        let finished = Finished {
            status,
            fault: slot.fault(),
        };
        lock(&self.finished).insert(instance_id, finished);
        self.remove(instance_id);
        slot.unpark();
        slot.publish(status);
        debug!(%instance_id, %status, "Instance released");
    }

    /// The error for an operation on an instance that is not loaded.
    fn not_loaded(&self, instance_id: InstanceId, operation: &'static str) -> Error {
        match self.finished(instance_id) {
            Some(finished) => Error::InvalidState {
                instance_id,
                operation,
                status: finished.status.to_string(),
            },
            None => Error::UnknownInstance(instance_id),
        }
    }

    pub(crate) fn status(&self, instance_id: InstanceId) -> Result<InstanceStatus> {
        if let Some(slot) = self.slot(instance_id) {
            return Ok(slot.status());
        }
        self.finished(instance_id)
            .map(|finished| finished.status)
            .ok_or(Error::UnknownInstance(instance_id))
    }

    /// Load a scheme through the scheme loader, once per URI.
    ///
    /// Schemes that use an activity kind nobody registered are rejected.
    async fn scheme(&self, uri: &str) -> Result<Arc<Scheme>> {
        let mut schemes = self.schemes.lock().await;
        if let Some(scheme) = schemes.get(uri) {
            return Ok(Arc::clone(scheme));
        }

        let scheme = self
            .services
            .scheme_loader()?
            .create_instance(uri, &self.auxiliary)
            .await?;
        for def in scheme.activities() {
            if !self.activities.contains(def.kind()) {
                return Err(Error::scheme(
                    uri,
                    SourceLocation::Activity(def.path().to_owned()),
                    format!("unknown activity kind `{}`", def.kind()),
                ));
            }
        }

        debug!(scheme = %scheme.name(), uri, activities = scheme.len(), "Scheme loaded");
        schemes.insert(uri.to_owned(), Arc::clone(&scheme));
        Ok(scheme)
    }

    /// Enqueue a work item; items for a closed queue are dropped.
    pub(crate) async fn dispatch(&self, item: WorkItem) {
        if self.queue.enqueue(item).await.is_err() {
            debug!(
                instance_id = %item.instance_id,
                resume = ?item.resume,
                "Queue closed, dropping work item"
            );
        }
    }

    /// Rebuild the live state of an unloaded instance from persistence.
    ///
    /// Released instances are not brought back.
    async fn ensure_loaded<'a>(
        &self,
        instance_id: InstanceId,
        run: &'a mut Option<InstanceRun>,
    ) -> Result<&'a mut InstanceRun> {
        if run.is_none() {
            if let Some(finished) = self.finished(instance_id) {
                return Err(Error::InvalidState {
                    instance_id,
                    operation: "be reloaded",
                    status: finished.status.to_string(),
                });
            }
            let ctx = self
                .services
                .persistence()?
                .load_instance_state(instance_id)
                .await?;
            let scheme = self.scheme(ctx.scheme_uri()).await?;
            *run = Some(InstanceRun::restore(scheme, ctx, &self.activities)?);
            debug!(instance_id = %instance_id, "Instance reloaded");
        }
        run.as_mut().ok_or(Error::UnknownInstance(instance_id))
    }

    async fn save(&self, run: &mut InstanceRun) -> Result<()> {
        let persistence = self.services.persistence()?;
        persistence.save_instance_state(run.snapshot()).await
    }

    /// Execute one work item.
    ///
    /// Failures that concern the instance itself are recorded on the
    /// instance; only infrastructure errors are returned.
    pub(crate) async fn process(self: &Arc<Self>, item: WorkItem, worker_id: &str) -> Result<()> {
        let Some(slot) = self.slot(item.instance_id) else {
            debug!(instance_id = %item.instance_id, "Instance not loaded, dropping work item");
            return Ok(());
        };

        let mut guard = slot.run.lock().await;
        if guard.is_none() && self.finished(item.instance_id).is_some() {
            debug!(instance_id = %item.instance_id, "Instance released, dropping work item");
            return Ok(());
        }
        let run = self.ensure_loaded(item.instance_id, &mut guard).await?;
        let Some(step) = run
            .advance(&self.activities, item.resume, slot.cancel_event())
            .await
        else {
            return Ok(());
        };

        match &step {
            Step::Suspended(request) => debug!(
                instance_id = %item.instance_id,
                worker_id,
                ?request,
                "Instance suspended"
            ),
            Step::Completed => info!(instance_id = %item.instance_id, worker_id, "Instance completed"),
            Step::Faulted(err) => {
                error!(
                    instance_id = %item.instance_id,
                    worker_id,
                    activity = run.context().fault().and_then(|f| f.activity.as_deref()).unwrap_or_default(),
                    error = %err,
                    "Instance faulted"
                );
                slot.set_fault(Arc::clone(err));
            }
            Step::Cancelled => info!(instance_id = %item.instance_id, worker_id, "Instance cancelled"),
        }

        let saved = match self.save(run).await {
            Ok(()) => true,
            Err(err) => {
                warn!(instance_id = %item.instance_id, error = %err, "Failed to save instance state");
                false
            }
        };
        let status = run.status();

        match step {
            Step::Suspended(request) => {
                slot.publish(status);
                let parking = Parking::from_request(&request, run.context().suspension());
                if self.config.unload_on_suspend && saved {
                    *guard = None;
                }
                slot.park(parking, Arc::downgrade(self))?;
            }
            _ if saved => {
                *guard = None;
                drop(guard);
                self.release(&slot, status);
            }
            // Kept loaded so `persist` can retry the save
            _ => {
                slot.unpark();
                slot.publish(status);
            }
        }
        Ok(())
    }

    /// A copy of the context, read from persistence for instances that are
    /// unloaded or released.
    pub(crate) async fn context(&self, instance_id: InstanceId) -> Result<ExecutionContext> {
        let slot = match self.slot(instance_id) {
            Some(slot) => slot,
            None if self.finished(instance_id).is_some() => {
                return self
                    .services
                    .persistence()?
                    .load_instance_state(instance_id)
                    .await;
            }
            None => return Err(Error::UnknownInstance(instance_id)),
        };
        let mut guard = slot.run.lock().await;
        match guard.as_mut() {
            Some(run) => Ok(run.snapshot().clone()),
            None => {
                self.services
                    .persistence()?
                    .load_instance_state(instance_id)
                    .await
            }
        }
    }

    /// Set an instance variable.
    ///
    /// Released instances are updated in persistence directly.
    pub(crate) async fn set_variable(&self, instance_id: InstanceId, name: String, value: Value) -> Result<()> {
        let Some(slot) = self.slot(instance_id) else {
            if self.finished(instance_id).is_none() {
                return Err(Error::UnknownInstance(instance_id));
            }
            let persistence = self.services.persistence()?;
            let mut ctx = persistence.load_instance_state(instance_id).await?;
            ctx.set_variable(name, value);
            return persistence.save_instance_state(&ctx).await;
        };
        let mut guard = slot.run.lock().await;
        let run = self.ensure_loaded(instance_id, &mut guard).await?;
        run.context_mut().set_variable(name, value);
        Ok(())
    }
}

/// Executes workflow instances on a pool of workers.
///
/// Cloning is cheap; clones share the same instances and queue.
///
/// # Lifecycle
///
/// 1. Create with [`WorkflowRuntime::builder(services)`](WorkflowRuntime::builder)
/// 2. Register activity kinds with [`WorkflowBuilder::register()`]
/// 3. Build with [`WorkflowBuilder::build()`]
/// 4. Run the workers with [`WorkflowRuntime::run()`]
/// 5. Start instances with [`WorkflowRuntime::start_instance()`]
#[derive(Clone)]
pub struct WorkflowRuntime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl WorkflowRuntime {
    /// Create a new runtime builder.
    pub fn builder(services: ServiceHost) -> WorkflowBuilder {
        WorkflowBuilder::new(services)
    }

    /// Returns the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Returns the worker identifier.
    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// Ids of the instances currently held in memory.
    ///
    /// Finished instances are released once their final state is saved.
    pub fn instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = lock(&self.inner.instances).keys().copied().collect();
        ids.sort();
        ids
    }

    /// Create an instance of the scheme at `scheme_uri` and queue it to start.
    ///
    /// The created context is saved before the instance is queued. A scheme
    /// that fails to load or validate is reported here, before any instance
    /// exists.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let id = runtime
    ///     .start_instance("file:///etc/schemes/approval.json", BTreeMap::from([
    ///         ("amount".to_string(), json!(1200)),
    ///     ]))
    ///     .await?;
    /// ```
    pub async fn start_instance(
        &self,
        scheme_uri: &str,
        variables: BTreeMap<String, Value>,
    ) -> Result<InstanceId> {
        let scheme = self.inner.scheme(scheme_uri).await?;
        let ctx = ExecutionContext::new(InstanceId::new(), scheme_uri, scheme.name(), variables);
        let instance_id = ctx.instance_id();

        let mut run = InstanceRun::new(scheme, ctx);
        if let Err(err) = self.inner.save(&mut run).await {
            warn!(%instance_id, error = %err, "Failed to save created instance");
        }

        self.inner
            .insert(Arc::new(InstanceSlot::new(instance_id, run)), instance_id);
        self.inner
            .queue
            .enqueue(WorkItem::new(instance_id, Resume::Start))
            .await?;

        info!(%instance_id, scheme_uri, "Instance started");
        Ok(instance_id)
    }

    /// Load a persisted instance and continue it.
    ///
    /// Running instances are queued, sleeping and waiting ones are parked
    /// with whatever time their suspension has left. Returns the status the
    /// instance was loaded in. Instances already held by the runtime are
    /// left as they are, and finished ones are not loaded.
    pub async fn resume_instance(&self, instance_id: InstanceId) -> Result<InstanceStatus> {
        if let Ok(status) = self.inner.status(instance_id) {
            return Ok(status);
        }

        let ctx = self
            .inner
            .services
            .persistence()?
            .load_instance_state(instance_id)
            .await?;
        if ctx.status().is_finished() {
            let status = ctx.status();
            lock(&self.inner.finished).insert(instance_id, Finished { status, fault: None });
            debug!(%instance_id, %status, "Instance already finished");
            return Ok(status);
        }

        let scheme = self.inner.scheme(ctx.scheme_uri()).await?;
        let parking = ctx
            .suspension()
            .map(|suspension| Parking::from_suspension(suspension, OffsetDateTime::now_utc()));
        let run = InstanceRun::restore(scheme, ctx, &self.inner.activities)?;
        let status = run.status();

        let slot = Arc::new(InstanceSlot::new(instance_id, run));
        self.inner.insert(Arc::clone(&slot), instance_id);

        match (status, parking) {
            (InstanceStatus::Created | InstanceStatus::Running, _) => {
                self.inner
                    .queue
                    .enqueue(WorkItem::new(instance_id, Resume::Start))
                    .await?;
            }
            (InstanceStatus::Sleeping | InstanceStatus::WaitingExternal, Some(parking)) => {
                slot.park(parking, Arc::downgrade(&self.inner))?;
            }
            _ => {}
        }

        info!(%instance_id, %status, "Instance resumed");
        Ok(status)
    }

    /// Deliver an external signal to an instance.
    ///
    /// The payload becomes visible through
    /// [`ActivityContext::signal`](crate::ActivityContext::signal) once the
    /// instance resumes from a wait for it. A signal the instance is not
    /// waiting for yet is buffered and counts as received when a later wait
    /// asks for it. Finished instances reject signals.
    pub async fn signal(
        &self,
        instance_id: InstanceId,
        name: impl Into<String>,
        payload: Value,
    ) -> Result<()> {
        let name = name.into();
        let slot = self
            .inner
            .slot(instance_id)
            .ok_or_else(|| self.inner.not_loaded(instance_id, "receive signals"))?;
        let awaited = {
            let mut guard = slot.run.lock().await;
            let run = self.inner.ensure_loaded(instance_id, &mut guard).await?;
            if run.status().is_finished() {
                return Err(Error::InvalidState {
                    instance_id,
                    operation: "receive signals",
                    status: run.status().to_string(),
                });
            }

            let awaited = matches!(
                run.context().suspension(),
                Some(Suspension::WaitingExternal { signals, .. }) if signals.contains(&name)
            );
            let ctx = run.context_mut();
            if !awaited {
                ctx.buffer_signal(name.clone(), payload);
            } else if let Some(Suspension::WaitingExternal { received, .. }) = ctx.suspension_mut() {
                received.insert(name.clone(), payload);
            }

            if let Err(err) = self.inner.save(run).await {
                warn!(%instance_id, error = %err, "Failed to save received signal");
            }
            awaited
        };

        if awaited {
            debug!(%instance_id, signal = %name, "Signal delivered");
            slot.deliver(&name);
        } else {
            debug!(%instance_id, signal = %name, "Signal buffered");
        }
        Ok(())
    }

    /// Cancel an instance.
    ///
    /// Stops any parked wait, uninitializes the active chain and marks the
    /// instance `Cancelled`. A running action is allowed to finish first.
    /// Cancelling a finished instance does nothing.
    pub async fn cancel(&self, instance_id: InstanceId) -> Result<()> {
        let Some(slot) = self.inner.slot(instance_id) else {
            return match self.inner.finished(instance_id) {
                Some(_) => Ok(()),
                None => Err(Error::UnknownInstance(instance_id)),
            };
        };
        slot.cancel_event().set();
        slot.unpark();

        let mut guard = slot.run.lock().await;
        if guard.is_none() && self.inner.finished(instance_id).is_some() {
            return Ok(());
        }
        let run = self.inner.ensure_loaded(instance_id, &mut guard).await?;
        if run.status().is_finished() {
            return Ok(());
        }

        run.cancel().await;
        // A step that was executing when the cancel event was set parks
        // after the first unpark
        slot.unpark();
        let saved = match self.inner.save(run).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%instance_id, error = %err, "Failed to save cancelled instance");
                false
            }
        };
        let status = run.status();
        info!(%instance_id, "Instance cancelled");

        if saved {
            *guard = None;
            drop(guard);
            self.inner.release(&slot, status);
        } else {
            slot.publish(status);
        }
        Ok(())
    }

    /// Save an instance and drop it from memory.
    ///
    /// If the save fails the instance stays loaded and the error is
    /// returned. Use [`resume_instance`](Self::resume_instance) to load it
    /// again.
    pub async fn unload(&self, instance_id: InstanceId) -> Result<()> {
        let Some(slot) = self.inner.slot(instance_id) else {
            return match self.inner.finished(instance_id) {
                Some(_) => Ok(()),
                None => Err(Error::UnknownInstance(instance_id)),
            };
        };
        let mut guard = slot.run.lock().await;
        if let Some(run) = guard.as_mut() {
            self.inner.save(run).await?;
        }

        *guard = None;
        drop(guard);
        let status = slot.status();
        if status.is_finished() {
            self.inner.release(&slot, status);
        } else {
            slot.unpark();
            self.inner.remove(instance_id);
        }

        debug!(%instance_id, "Instance unloaded");
        Ok(())
    }

    /// Save the current state of an instance.
    ///
    /// Retries a save that failed while the instance was executing. A
    /// finished instance is released once the save succeeds.
    pub async fn persist(&self, instance_id: InstanceId) -> Result<()> {
        let Some(slot) = self.inner.slot(instance_id) else {
            return match self.inner.finished(instance_id) {
                Some(_) => Ok(()),
                None => Err(Error::UnknownInstance(instance_id)),
            };
        };
        let mut guard = slot.run.lock().await;
        let Some(run) = guard.as_mut() else {
            return Ok(());
        };
        self.inner.save(run).await?;

        let status = run.status();
        if status.is_finished() {
            *guard = None;
            drop(guard);
            self.inner.release(&slot, status);
        }
        Ok(())
    }

    /// Current status of an instance held in memory or finished while
    /// this runtime ran it.
    pub fn status(&self, instance_id: InstanceId) -> Result<InstanceStatus> {
        self.inner.status(instance_id)
    }

    /// Wait until the status of an instance satisfies `predicate`.
    ///
    /// Fails with [`Error::Timeout`] if that does not happen within
    /// `timeout`, and with [`Error::Closed`] if the instance is unloaded in
    /// the meantime or already finished with a status that does not match.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let status = runtime
    ///     .wait_for_status(id, InstanceStatus::is_finished, Duration::from_secs(5))
    ///     .await?;
    /// ```
    pub async fn wait_for_status(
        &self,
        instance_id: InstanceId,
        predicate: impl Fn(InstanceStatus) -> bool,
        timeout: Duration,
    ) -> Result<InstanceStatus> {
        let Some(slot) = self.inner.slot(instance_id) else {
            return match self.inner.finished(instance_id) {
                Some(finished) if predicate(finished.status) => Ok(finished.status),
                Some(_) => Err(Error::Closed),
                None => Err(Error::UnknownInstance(instance_id)),
            };
        };
        let mut status = slot.subscribe();
        drop(slot);
        match tokio::time::timeout(timeout, status.wait_for(|s| predicate(*s))).await {
            Ok(Ok(status)) => Ok(*status),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// The error that faulted an instance, if it faulted while this runtime
    /// ran it.
    pub fn fault(&self, instance_id: InstanceId) -> Option<Arc<Error>> {
        match self.inner.slot(instance_id) {
            Some(slot) => slot.fault(),
            None => self.inner.finished(instance_id)?.fault,
        }
    }

    /// A copy of the instance's current context.
    pub async fn context(&self, instance_id: InstanceId) -> Result<ExecutionContext> {
        self.inner.context(instance_id).await
    }

    /// Set an instance variable.
    ///
    /// Waits for a running action to return first. The change is saved
    /// with the next state save.
    pub async fn set_variable(
        &self,
        instance_id: InstanceId,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.inner
            .set_variable(instance_id, name.into(), value.into())
            .await
    }

    /// Run the workers until `shutdown` completes.
    ///
    /// # Shutdown Behavior
    ///
    /// When the shutdown future completes:
    /// 1. Workers stop taking new items; queued items are discarded, since
    ///    every instance's state is already persisted
    /// 2. Parked waits are released
    /// 3. Running actions are awaited up to `shutdown_timeout`
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tokio::signal;
    ///
    /// runtime.run(async { signal::ctrl_c().await.ok(); }).await?;
    /// ```
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker_count = self.inner.config.worker_count.max(1);

        info!(
            worker_id = %self.inner.worker_id,
            activity_kinds = self.inner.activities.len(),
            workers = worker_count,
            "Runtime starting"
        );

        let mut worker_handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let worker = Worker::new(
                Arc::clone(&self.inner),
                format!("{}-worker-{}", self.inner.worker_id, i),
            );
            let worker_shutdown_rx = shutdown_rx.clone();
            worker_handles.push(tokio::spawn(async move {
                worker.run(worker_shutdown_rx).await;
            }));
        }

        shutdown.await;

        let _ = shutdown_tx.send(true);
        let discarded = self.inner.queue.clear();
        self.inner.queue.close();
        let slots: Vec<_> = lock(&self.inner.instances).values().cloned().collect();
        for slot in slots {
            slot.unpark();
        }
        if discarded > 0 {
            debug!(worker_id = %self.inner.worker_id, discarded, "Discarded queued work items");
        }

        let shutdown_timeout = self.inner.config.shutdown_timeout;
        let all_workers = async {
            for handle in worker_handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(shutdown_timeout, all_workers).await {
            Ok(()) => {
                info!(worker_id = %self.inner.worker_id, "Runtime stopped gracefully");
            }
            Err(_) => {
                warn!(
                    worker_id = %self.inner.worker_id,
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Shutdown timeout exceeded, forcing stop"
                );
            }
        }

        Ok(())
    }
}
