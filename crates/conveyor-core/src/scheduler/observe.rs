//! Task observation: snapshot-then-events streams.

use tokio::sync::broadcast;

use crate::domain::{Payload, TaskRecord, TaskState};

/// Per-task broadcast capacity. Updates beyond this while a subscriber
/// lags are dropped for that subscriber (it skips ahead); the terminal
/// update is always the last one sent, so closure is never missed.
pub(crate) const OBSERVER_CAPACITY: usize = 64;

/// One observable point of a task's life: its state, latest progress and
/// (once succeeded) output.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub state: TaskState,
    pub progress: u8,
    pub output: Option<Payload>,
}

impl TaskUpdate {
    pub(crate) fn snapshot(record: &TaskRecord) -> Self {
        Self {
            state: record.state,
            progress: record.progress,
            output: record.output.clone(),
        }
    }
}

/// A lazy stream of [`TaskUpdate`]s for one task.
///
/// The first item is the snapshot taken at subscription time; every
/// state transition and progress report from then on follows. The stream
/// ends after a terminal state has been delivered (including the case
/// where the snapshot itself is terminal). Dropping the stream
/// unsubscribes; the task itself is unaffected.
pub struct Observation {
    pending_snapshot: Option<TaskUpdate>,
    rx: broadcast::Receiver<TaskUpdate>,
    done: bool,
}

impl Observation {
    pub(crate) fn new(snapshot: TaskUpdate, rx: broadcast::Receiver<TaskUpdate>) -> Self {
        Self {
            pending_snapshot: Some(snapshot),
            rx,
            done: false,
        }
    }

    /// Next update, or `None` once the stream is finished.
    pub async fn next(&mut self) -> Option<TaskUpdate> {
        if self.done {
            return None;
        }

        if let Some(snapshot) = self.pending_snapshot.take() {
            self.done = snapshot.state.is_terminal();
            return Some(snapshot);
        }

        loop {
            match self.rx.recv().await {
                Ok(update) => {
                    self.done = update.state.is_terminal();
                    return Some(update);
                }
                // Fell behind: skip what was dropped, keep reading.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    /// Drain the stream, collecting every state transition in order
    /// (consecutive duplicates collapsed, progress-only updates skipped).
    pub async fn state_trace(&mut self) -> Vec<TaskState> {
        let mut states = Vec::new();
        while let Some(update) = self.next().await {
            if states.last() != Some(&update.state) {
                states.push(update.state);
            }
        }
        states
    }

    /// Drain the stream and return the final update.
    pub async fn last(&mut self) -> Option<TaskUpdate> {
        let mut last = None;
        while let Some(update) = self.next().await {
            last = Some(update);
        }
        last
    }
}
