use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use ironstep::{
    InMemoryStore, InstanceId, InstanceStatus, JsonSchemeLoader, RuntimeConfig, ServiceHost,
    WorkflowRuntime,
};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::activities::{self, Journal};

/// Initialize tracing for tests. Safe to call multiple times.
///
/// Uses a standard filter for ironstep debugging. The `try_init()` call
/// is idempotent - subsequent calls are no-ops if already initialized.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ironstep=debug")
        .try_init();
}

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fast runtime config for tests.
pub fn test_runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        worker_count: 2,
        dequeue_timeout: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Manages runtime lifecycle for tests. Drop signals shutdown automatically.
pub struct TestApp {
    pub runtime: WorkflowRuntime,
    pub store: InMemoryStore,
    pub journal: Journal,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

pub struct TestAppBuilder {
    loader: JsonSchemeLoader,
    store: InMemoryStore,
    journal: Journal,
    config: RuntimeConfig,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            loader: JsonSchemeLoader::new(),
            store: InMemoryStore::new(),
            journal: Journal::new(),
            config: test_runtime_config(),
        }
    }

    /// Serve a scheme document from memory.
    pub fn scheme(self, (uri, content): (&str, &str)) -> Self {
        self.loader.add_document(uri, content);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share state with another app, as a restarted process would.
    pub fn store(mut self, store: InMemoryStore) -> Self {
        self.store = store;
        self
    }

    pub fn journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Build the runtime without starting workers.
    pub fn build(self) -> Result<(WorkflowRuntime, InMemoryStore, Journal)> {
        let services = ServiceHost::new(self.loader, self.store.clone());
        let runtime = activities::register(WorkflowRuntime::builder(services), &self.journal)
            .config(self.config)
            .build()?;
        Ok((runtime, self.store, self.journal))
    }

    /// Build the runtime and spawn its workers in background.
    pub fn build_and_run(self) -> Result<TestApp> {
        let (runtime, store, journal) = self.build()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let workers = runtime.clone();
        let handle = tokio::spawn(async move {
            workers
                .run(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .map_err(anyhow::Error::from)
        });

        Ok(TestApp {
            runtime,
            store,
            journal,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::new()
    }

    pub async fn start(&self, uri: &str) -> Result<InstanceId> {
        self.start_with(uri, BTreeMap::new()).await
    }

    pub async fn start_with(&self, uri: &str, variables: BTreeMap<String, Value>) -> Result<InstanceId> {
        Ok(self.runtime.start_instance(uri, variables).await?)
    }

    /// Wait until the instance completes, faults or is cancelled.
    pub async fn wait_finished(&self, id: InstanceId) -> Result<InstanceStatus> {
        self.runtime
            .wait_for_status(id, InstanceStatus::is_finished, DEFAULT_TEST_TIMEOUT)
            .await
            .with_context(|| format!("waiting for instance {id} to finish"))
    }

    pub async fn wait_status(&self, id: InstanceId, status: InstanceStatus) -> Result<()> {
        self.runtime
            .wait_for_status(id, |s| s == status, DEFAULT_TEST_TIMEOUT)
            .await
            .with_context(|| format!("waiting for instance {id} to be {status}"))?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await??;
        }
        Ok(())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
