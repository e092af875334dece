//! TaskExecutor port: the external collaborator that does the actual work.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::domain::{Payload, TaskId};

/// Terminal outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Work done; the payload becomes the task's output.
    Success(Payload),

    /// Work failed with a reason. The scheduler decides retry vs. fail
    /// from the task's retry policy.
    Failure(String),

    /// The executor asks to be re-run later (transient condition).
    /// Scheduled exactly like a failure, without an error of its own.
    Retry,
}

/// A single unit of work, registered per `kind`.
///
/// The scheduler calls `run` once per attempt. Executors should watch
/// `stop` at convenient points and return promptly once it fires; the
/// stop signal is advisory and the scheduler never interrupts a running
/// executor forcibly before the cancellation grace period expires.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(
        &self,
        input: &Payload,
        progress: ProgressReporter,
        stop: StopSignal,
    ) -> ExecutionOutcome;
}

/// One progress report from a running attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub task_id: TaskId,
    pub progress: u8,
}

/// Handle an executor uses to stream progress (0–100) back to the
/// scheduler. Reports are fire-and-forget; they never block the work.
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: TaskId,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    pub(crate) fn new(task_id: TaskId, tx: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self { task_id, tx }
    }

    /// A reporter whose updates go nowhere. For testing executors in
    /// isolation.
    pub fn detached(task_id: TaskId) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { task_id, tx }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn report(&self, progress: u8) {
        // send only fails when the scheduler is gone; nothing to do then
        let _ = self.tx.send(ProgressUpdate {
            task_id: self.task_id,
            progress: progress.min(100),
        });
    }
}

/// Cooperative cancellation signal handed to each attempt.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
    // only used by `never()`: keeps the sender alive so the signal stays quiet
    _keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl StopSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self {
            rx,
            _keepalive: None,
        }
    }

    /// A signal that never fires. For testing executors in isolation.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Has a stop been requested?
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until a stop is requested (or the scheduler goes away).
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // sender dropped: the attempt is being torn down
                return;
            }
        }
    }
}
