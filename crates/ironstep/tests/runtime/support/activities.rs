//! Activities used by the integration tests.
//!
//! Every activity writes its lifecycle calls to a shared [`Journal`]:
//! `init:Name`, `exec:Name`, `uninit:Name` and `restore:Name`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ironstep::{
    Activity, ActivityContext, Error, NonEmpty, ParamEnum, Parameters, Properties, Result,
    TransitionKey, WorkflowBuilder,
};
use serde_json::{Value, json};

/// Ordered record of activity calls, shared by all activity objects.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    /// Assert every initialized activity was uninitialized exactly once.
    ///
    /// Restored objects continue the activity their unloaded predecessor
    /// initialized, so `restore:` entries are not counted.
    pub fn assert_balanced(&self) {
        let entries = self.entries();
        let mut entered: Vec<_> = entries
            .iter()
            .filter_map(|e| e.strip_prefix("init:"))
            .collect();
        let mut left: Vec<_> = entries
            .iter()
            .filter_map(|e| e.strip_prefix("uninit:"))
            .collect();

        entered.sort_unstable();
        left.sort_unstable();
        assert_eq!(
            entered, left,
            "unbalanced initialize/uninitialize in {entries:?}"
        );
    }
}

/// Register every test activity kind, all writing to `journal`.
pub fn register(builder: WorkflowBuilder, journal: &Journal) -> WorkflowBuilder {
    let process = journal.clone();
    let step = journal.clone();
    let sleeper = journal.clone();
    let waiter = journal.clone();
    let failer = journal.clone();

    builder
        .register_with("process", move |_| {
            Box::new(Process::new(process.clone())) as Box<dyn Activity>
        })
        .register_with("step", move |_| Box::new(Step::new(step.clone())) as Box<dyn Activity>)
        .register_with("sleeper", move |def| {
            Box::new(Sleeper::new(sleeper.clone(), def.name())) as Box<dyn Activity>
        })
        .register_with("waiter", move |_| Box::new(Waiter::new(waiter.clone())) as Box<dyn Activity>)
        .register_with("failer", move |_| Box::new(Failer::new(failer.clone())) as Box<dyn Activity>)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ParamEnum)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Composite root exposing `Owner` (from the `owner` variable) and `Limit`.
#[derive(Properties)]
pub struct Process {
    #[property(skip)]
    journal: Journal,
    owner: String,
    #[property(rename = "Limit")]
    max_amount: i64,
}

impl Process {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            owner: String::new(),
            max_amount: 100,
        }
    }
}

#[async_trait]
impl Activity for Process {
    async fn initialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.owner = ctx
            .variable("owner")
            .and_then(Value::as_str)
            .unwrap_or("nobody")
            .to_string();
        self.journal.record(format!("init:{}", ctx.activity_name()));
        Ok(())
    }

    async fn uninitialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("uninit:{}", ctx.activity_name()));
        Ok(())
    }

    fn snapshot(&self) -> Option<Value> {
        Some(json!({ "owner": self.owner }))
    }

    fn restore(&mut self, state: Value) -> Result<()> {
        self.owner = state["owner"].as_str().unwrap_or_default().to_string();
        Ok(())
    }
}

/// Leaf that returns its `Key` parameter, or the default key.
///
/// Optional parameters: `Note` (recorded as `note:Name=value`), `Priority`
/// (recorded as `priority:Name=Member`) and `Signal` (records the payload of
/// that signal as `signal:name=payload`).
#[derive(Properties)]
pub struct Step {
    #[property(skip)]
    journal: Journal,
    visits: i64,
    priority: Option<Priority>,
}

impl Step {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            visits: 0,
            priority: None,
        }
    }
}

#[async_trait]
impl Activity for Step {
    async fn initialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("init:{}", ctx.activity_name()));
        Ok(())
    }

    async fn execute(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        params: &Parameters,
    ) -> Result<TransitionKey> {
        let name = ctx.activity_name().to_string();
        self.visits += 1;
        self.journal.record(format!("exec:{name}"));

        if let Some(note) = params.get_or::<Option<String>>("Note", None)? {
            self.journal.record(format!("note:{name}={note}"));
        }
        if let Some(priority) = params.get_or::<Option<Priority>>("Priority", None)? {
            self.priority = Some(priority);
            self.journal.record(format!("priority:{name}={}", priority.name()));
        }
        if let Some(signal) = params.get_or::<Option<String>>("Signal", None)? {
            let payload = ctx.signal(&signal).cloned().unwrap_or(Value::Null);
            self.journal.record(format!("signal:{signal}={payload}"));
        }

        let key: String = params.get_or("Key", ctx.default_transition_key().into_inner())?;
        Ok(key.into())
    }

    async fn uninitialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("uninit:{}", ctx.activity_name()));
        Ok(())
    }
}

/// Leaf that sleeps for its `Delay` parameter, then takes `Key`.
#[derive(Properties)]
pub struct Sleeper {
    #[property(skip)]
    journal: Journal,
    #[property(skip)]
    name: String,
    naps: i64,
}

impl Sleeper {
    fn new(journal: Journal, name: &str) -> Self {
        Self {
            journal,
            name: name.to_string(),
            naps: 0,
        }
    }
}

#[async_trait]
impl Activity for Sleeper {
    async fn initialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("init:{}", ctx.activity_name()));
        Ok(())
    }

    async fn execute(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        params: &Parameters,
    ) -> Result<TransitionKey> {
        self.naps += 1;
        self.journal.record(format!("exec:{}", ctx.activity_name()));

        let delay: Duration = params.get("Delay")?;
        ctx.sleep(delay)?;

        let key: String = params.get_or("Key", ctx.default_transition_key().into_inner())?;
        Ok(key.into())
    }

    async fn uninitialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("uninit:{}", ctx.activity_name()));
        Ok(())
    }

    fn snapshot(&self) -> Option<Value> {
        Some(json!({ "naps": self.naps }))
    }

    fn restore(&mut self, state: Value) -> Result<()> {
        self.naps = state["naps"].as_i64().unwrap_or_default();
        self.journal.record(format!("restore:{}", self.name));
        Ok(())
    }
}

/// Leaf that waits for every signal in its `Signals` list.
///
/// With a `Timeout` parameter the wait navigates with `Expired` when it
/// runs out.
#[derive(Properties)]
pub struct Waiter {
    #[property(skip)]
    journal: Journal,
}

impl Waiter {
    fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl Activity for Waiter {
    async fn initialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("init:{}", ctx.activity_name()));
        Ok(())
    }

    async fn execute(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        params: &Parameters,
    ) -> Result<TransitionKey> {
        self.journal.record(format!("exec:{}", ctx.activity_name()));

        let signals: Vec<String> = params.get("Signals")?;
        let signals = NonEmpty::from_vec(signals)
            .ok_or_else(|| Error::custom("`Signals` must name at least one signal"))?;
        match params.get_or::<Option<Duration>>("Timeout", None)? {
            Some(timeout) => ctx.wait_for_signals_timeout(signals, timeout, "Expired")?,
            None => ctx.wait_for_signals(signals)?,
        }

        let key: String = params.get_or("Key", ctx.default_transition_key().into_inner())?;
        Ok(key.into())
    }

    async fn uninitialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("uninit:{}", ctx.activity_name()));
        Ok(())
    }
}

/// Leaf whose action always fails.
#[derive(Properties)]
pub struct Failer {
    #[property(skip)]
    journal: Journal,
}

impl Failer {
    fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl Activity for Failer {
    async fn initialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("init:{}", ctx.activity_name()));
        Ok(())
    }

    async fn execute(
        &mut self,
        ctx: &mut ActivityContext<'_>,
        _params: &Parameters,
    ) -> Result<TransitionKey> {
        self.journal.record(format!("exec:{}", ctx.activity_name()));
        Err(Error::custom("payment gateway unavailable"))
    }

    async fn uninitialize(&mut self, ctx: &mut ActivityContext<'_>) -> Result<()> {
        self.journal.record(format!("uninit:{}", ctx.activity_name()));
        Ok(())
    }
}
