//! TaskStore port: the durable record of tasks and their states.

use async_trait::async_trait;

use crate::domain::{SchedulerError, TaskId, TaskRecord, TaskState};

/// Durable record store for task state.
///
/// Design intent:
/// - The dispatch actor is the only writer; implementations still
///   serialize access internally so a store handle can be shared safely.
/// - `get`/`update` of an unknown id fail with `SchedulerError::NotFound`.
/// - `all()` exists for the reload path at process start: every
///   non-terminal record is re-admitted into the dispatch loop.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace a record.
    async fn put(&self, record: TaskRecord) -> Result<(), SchedulerError>;

    async fn get(&self, id: TaskId) -> Result<TaskRecord, SchedulerError>;

    /// All records currently in the given state.
    async fn list_by_state(&self, state: TaskState) -> Result<Vec<TaskRecord>, SchedulerError>;

    /// Apply a mutation to one record and persist the result.
    async fn update(
        &self,
        id: TaskId,
        mutation: Box<dyn for<'a> FnOnce(&'a mut TaskRecord) + Send>,
    ) -> Result<TaskRecord, SchedulerError>;

    /// Every record in the store (reload path).
    async fn all(&self) -> Result<Vec<TaskRecord>, SchedulerError>;
}
