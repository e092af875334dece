//! Scheduler: public handle, builder and configuration.
//!
//! The engine itself lives in [`dispatch`]; this module wires it up and
//! exposes the thin, channel-backed [`Scheduler`] handle callers use.

mod chain;
mod dispatch;
mod observe;
mod pool;
mod registry;

pub use observe::{Observation, TaskUpdate};
pub use registry::ExecutorRegistry;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::domain::{SchedulerError, TaskDefinition, TaskId, TaskRecord};
use crate::ports::{ConditionsProvider, Notifier, NoopNotifier, SharedConditions, TaskExecutor, TaskStore};
use crate::store::MemoryStore;

use dispatch::{Command, Dispatcher};

/// Tunables of the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent worker slots (values below 1 are treated as 1).
    pub worker_slots: usize,

    /// How long a cancelled attempt may keep running after its stop
    /// signal before it is forcibly aborted.
    pub cancel_grace: Duration,

    /// Re-evaluation cadence while constraint-gated tasks are waiting.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_slots: 4,
            cancel_grace: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Builder wiring executors, store, notifier and conditions into a
/// running scheduler.
///
/// # Example
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .executor("image.resize", Arc::new(ResizeExecutor))?
///     .store(Arc::new(JsonFileStore::open("tasks.json").await?))
///     .start();
/// ```
///
/// Executor registration is fail-fast: a duplicate kind errors at build
/// time, and submissions referencing an unregistered kind are rejected,
/// so the dispatch loop never hits a missing executor.
pub struct SchedulerBuilder {
    registry: ExecutorRegistry,
    store: Option<Arc<dyn TaskStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    conditions: Option<Arc<dyn ConditionsProvider>>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            registry: ExecutorRegistry::new(),
            store: None,
            notifier: None,
            conditions: None,
            config: SchedulerConfig::default(),
        }
    }

    /// Register the executor that runs tasks of `kind`.
    pub fn executor(
        mut self,
        kind: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self, SchedulerError> {
        self.registry.register(kind, executor)?;
        Ok(self)
    }

    /// Defaults to an in-memory store (no durability).
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`NoopNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Defaults to [`SharedConditions`] reporting a healthy device.
    pub fn conditions(mut self, conditions: Arc<dyn ConditionsProvider>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the dispatch actor and return the handle.
    ///
    /// The actor first reloads persisted records (re-admitting all
    /// non-terminal work), then starts serving commands; submissions
    /// made in the meantime queue up and are processed in order.
    pub fn start(self) -> Scheduler {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(NoopNotifier::default()));
        let conditions = self
            .conditions
            .unwrap_or_else(|| Arc::new(SharedConditions::default()));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            store,
            Arc::new(self.registry),
            notifier,
            conditions,
            self.config,
            cmd_tx.clone(),
            progress_tx,
        );
        let join = tokio::spawn(dispatcher.run(cmd_rx, progress_rx));
        Scheduler { cmd_tx, join }
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running scheduler.
///
/// Cheap to use from many tasks at once; every call is a message to the
/// dispatch actor. Submission never waits for execution, only for
/// admission (validation + persistence).
pub struct Scheduler {
    cmd_tx: mpsc::UnboundedSender<Command>,
    join: JoinHandle<()>,
}

impl Scheduler {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> Command,
    ) -> Result<T, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| SchedulerError::Shutdown)?;
        rx.await.map_err(|_| SchedulerError::Shutdown)?
    }

    /// Admit a task. Returns its id once the record is validated and
    /// persisted; execution happens asynchronously.
    pub async fn submit(&self, definition: TaskDefinition) -> Result<TaskId, SchedulerError> {
        self.request(|reply| Command::Submit { definition, reply })
            .await
    }

    /// Cancel a task in any non-terminal state. Running work receives a
    /// stop signal and the configured grace period.
    pub async fn cancel(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Subscribe to a task's state/progress stream (see [`Observation`]).
    pub async fn observe(&self, id: TaskId) -> Result<Observation, SchedulerError> {
        self.request(|reply| Command::Observe { id, reply }).await
    }

    /// Current record snapshot of a task.
    pub async fn status(&self, id: TaskId) -> Result<TaskRecord, SchedulerError> {
        self.request(|reply| Command::Status { id, reply }).await
    }

    /// Tell the scheduler the environment changed (charger plugged,
    /// network back, ...) so constraints are re-evaluated right away.
    pub fn conditions_changed(&self) {
        let _ = self.cmd_tx.send(Command::ConditionsChanged);
    }

    /// Stop the dispatch loop. In-flight attempts are aborted; their
    /// records stay persisted and are re-admitted on the next start.
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { reply: tx }).is_ok() {
            let _ = rx.await;
        }
        let _ = self.join.await;
    }
}
