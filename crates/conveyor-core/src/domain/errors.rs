//! Scheduler error types.

use thiserror::Error;

use super::ids::TaskId;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed submission; the task was never created.
    #[error("invalid task definition: {0}")]
    InvalidDefinition(String),

    /// Unknown id on get/update/cancel/observe.
    #[error("no task with id {0}")]
    NotFound(TaskId),

    /// An executor is already registered for this kind.
    #[error("duplicate executor for kind={0}")]
    DuplicateExecutor(String),

    /// The store could not read or write a record.
    #[error("task store failure: {0}")]
    Store(String),

    /// The dispatch loop has shut down; the handle is no longer usable.
    #[error("scheduler is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let id = TaskId::generate();
        let err = SchedulerError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));

        let err = SchedulerError::DuplicateExecutor("image.resize".into());
        assert!(err.to_string().contains("image.resize"));
    }
}
