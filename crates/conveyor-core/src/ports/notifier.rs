//! Notifier port: user-visible status surface.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::TaskId;

/// Opaque handle to an ongoing-status affordance (e.g. a persistent
/// notification) requested for a foreground task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForegroundToken(u64);

impl ForegroundToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// External status sink. Strictly fire-and-forget: nothing returned here
/// ever feeds back into scheduling state.
pub trait Notifier: Send + Sync {
    /// Surface a short status text to the user.
    fn notify(&self, text: &str);

    /// Ask for an ongoing-status affordance before a foreground task
    /// starts work.
    fn foreground_affordance(&self, task_id: TaskId) -> ForegroundToken;
}

/// Default notifier: swallows texts, hands out sequential tokens.
#[derive(Debug, Default)]
pub struct NoopNotifier {
    next_token: AtomicU64,
}

impl Notifier for NoopNotifier {
    fn notify(&self, _text: &str) {}

    fn foreground_affordance(&self, _task_id: TaskId) -> ForegroundToken {
        ForegroundToken::new(self.next_token.fetch_add(1, Ordering::Relaxed))
    }
}
