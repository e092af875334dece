//! Task state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// State transitions:
/// - Enqueued -> Running -> Succeeded
/// - Enqueued -> Running -> Retrying -> Enqueued (loop until attempts exhaust)
/// - Enqueued -> Running -> Failed (when attempts exhaust)
/// - Blocked -> Enqueued (chained task, predecessor succeeded)
/// - any non-terminal -> Cancelled
///
/// `Blocked` is the enqueued-but-gated form used by chained tasks whose
/// predecessor has not succeeded yet.
///
/// Design note: an enum keeps matching exhaustive and invalid states
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for eligibility (delay elapsed, constraints satisfied, slot free).
    Enqueued,

    /// Chained task waiting for its predecessor to succeed.
    Blocked,

    /// Claimed by the dispatcher; executing or waiting for a worker slot.
    Running,

    /// Failed attempt waiting out its backoff delay.
    Retrying,

    /// Completed successfully.
    Succeeded,

    /// Failed permanently (retries exhausted).
    Failed,

    /// Cancelled before completion.
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Is this task eligible for claiming (subject to delay/constraints)?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskState::Enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::succeeded(TaskState::Succeeded)]
    #[case::failed(TaskState::Failed)]
    #[case::cancelled(TaskState::Cancelled)]
    fn terminal_states(#[case] state: TaskState) {
        assert!(state.is_terminal());
        assert!(!state.is_runnable());
    }

    #[rstest]
    #[case::enqueued(TaskState::Enqueued)]
    #[case::blocked(TaskState::Blocked)]
    #[case::running(TaskState::Running)]
    #[case::retrying(TaskState::Retrying)]
    fn non_terminal_states(#[case] state: TaskState) {
        assert!(!state.is_terminal());
    }

    #[test]
    fn only_enqueued_is_runnable() {
        assert!(TaskState::Enqueued.is_runnable());
        assert!(!TaskState::Blocked.is_runnable());
        assert!(!TaskState::Running.is_runnable());
        assert!(!TaskState::Retrying.is_runnable());
    }
}
