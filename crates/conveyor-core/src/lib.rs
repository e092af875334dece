//! conveyor-core
//!
//! A deferred task scheduler: enqueue units of work with constraints,
//! retry policy and chaining, run them on a bounded worker pool, observe
//! state and progress, and survive process restarts through a durable
//! task store.
//!
//! # Module layout
//! - **domain**: the data model (ids, payloads, definitions, records,
//!   states, retry/backoff, constraints, errors)
//! - **ports**: seams to the outside world (TaskStore, TaskExecutor,
//!   Notifier, ConditionsProvider)
//! - **store**: TaskStore implementations (in-memory, JSON file)
//! - **scheduler**: the dispatch engine and its public handle
//!
//! # Quick tour
//! ```ignore
//! let scheduler = SchedulerBuilder::new()
//!     .executor("image.resize", Arc::new(ResizeExecutor))?
//!     .store(Arc::new(JsonFileStore::open("tasks.json").await?))
//!     .start();
//!
//! let id = scheduler
//!     .submit(
//!         TaskDefinition::new("image.resize")
//!             .with_input(Payload::from_pairs([("image_id", 42.into())]))
//!             .with_constraints(Constraints::none().charging()),
//!     )
//!     .await?;
//!
//! let mut updates = scheduler.observe(id).await?;
//! while let Some(update) = updates.next().await {
//!     println!("{:?} {}%", update.state, update.progress);
//! }
//! ```

pub mod domain;
pub mod ports;
pub mod scheduler;
pub mod store;

pub use domain::{
    BackoffKind, Constraints, Payload, Priority, RetryPolicy, Schedule, SchedulerError,
    SystemConditions, TaskDefinition, TaskId, TaskRecord, TaskState, MAX_BACKOFF,
};
pub use ports::{
    ConditionsProvider, ExecutionOutcome, ForegroundToken, NoopNotifier, Notifier,
    ProgressReporter, SharedConditions, StopSignal, TaskExecutor, TaskStore,
};
pub use scheduler::{
    ExecutorRegistry, Observation, Scheduler, SchedulerBuilder, SchedulerConfig, TaskUpdate,
};
pub use store::{JsonFileStore, MemoryStore};
