//! Task record: the scheduler-owned execution state of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::TaskDefinition;
use super::payload::Payload;
use super::state::TaskState;

/// Mutable execution record for a submitted task.
///
/// Design:
/// - This is the single source of truth for a task's state; the dispatch
///   actor is its only writer.
/// - All transitions go through the methods below, and every one of them
///   is a no-op once the record is terminal. That makes terminal states
///   idempotent by construction.
/// - Timestamps are wall-clock (`chrono`) so the record serializes into
///   the durable store and survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub definition: TaskDefinition,
    pub state: TaskState,

    /// Number of times this task entered Running.
    pub attempt_count: u32,

    /// Latest reported progress, 0–100.
    pub progress: u8,

    /// Output payload of a successful run.
    pub output: Option<Payload>,

    /// Last error reported by the executor (if any).
    pub last_error: Option<String>,

    /// When the current cycle was admitted to the queue.
    pub enqueued_at: DateTime<Utc>,

    /// Earliest instant the task may be dispatched (backoff / flex window).
    /// `None` means immediately.
    pub next_eligible_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Admit a definition as immediately enqueued.
    pub fn new(definition: TaskDefinition) -> Self {
        Self::with_state(definition, TaskState::Enqueued)
    }

    /// Admit a chained definition whose predecessor has not succeeded yet.
    pub fn new_blocked(definition: TaskDefinition) -> Self {
        Self::with_state(definition, TaskState::Blocked)
    }

    fn with_state(definition: TaskDefinition, state: TaskState) -> Self {
        let now = Utc::now();
        Self {
            definition,
            state,
            attempt_count: 0,
            progress: 0,
            output: None,
            last_error: None,
            enqueued_at: now,
            next_eligible_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> super::ids::TaskId {
        self.definition.id
    }

    /// Claim for execution: Running, attempt counted.
    pub fn start_attempt(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Running;
        self.attempt_count += 1;
        self.touch();
    }

    /// Terminal success with the executor's output.
    pub fn mark_succeeded(&mut self, output: Payload) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Succeeded;
        self.progress = 100;
        self.output = Some(output);
        self.touch();
    }

    /// Terminal failure (retries exhausted or unretryable).
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Failed;
        self.last_error = Some(error.into());
        self.touch();
    }

    /// Park for a backoff delay after a failed attempt.
    pub fn schedule_retry(&mut self, next_eligible_at: DateTime<Utc>, error: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Retrying;
        self.next_eligible_at = Some(next_eligible_at);
        self.last_error = Some(error.into());
        self.touch();
    }

    /// Backoff delay elapsed: back to the queue.
    pub fn requeue(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Enqueued;
        self.next_eligible_at = None;
        self.touch();
    }

    /// Chained task released by its predecessor's success.
    pub fn unblock(&mut self) {
        if self.state != TaskState::Blocked {
            return;
        }
        self.state = TaskState::Enqueued;
        self.enqueued_at = Utc::now();
        self.touch();
    }

    pub fn mark_cancelled(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Cancelled;
        self.touch();
    }

    /// Start the next periodic cycle, eligible at `eligible_at`.
    ///
    /// Attempt count and progress belong to a single cycle and reset here;
    /// the previous cycle's output was already delivered to observers.
    pub fn reset_for_next_cycle(&mut self, eligible_at: DateTime<Utc>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Enqueued;
        self.attempt_count = 0;
        self.progress = 0;
        self.output = None;
        self.last_error = None;
        self.enqueued_at = eligible_at;
        self.next_eligible_at = Some(eligible_at);
        self.touch();
    }

    /// Record a progress report. State is untouched.
    pub fn set_progress(&mut self, progress: u8) {
        if self.state.is_terminal() {
            return;
        }
        self.progress = progress.min(100);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::TaskDefinition;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskDefinition::new("test"))
    }

    #[test]
    fn start_attempt_counts_each_entry_into_running() {
        let mut r = record();
        r.start_attempt();
        assert_eq!(r.state, TaskState::Running);
        assert_eq!(r.attempt_count, 1);

        r.schedule_retry(Utc::now(), "boom");
        r.requeue();
        r.start_attempt();
        assert_eq!(r.attempt_count, 2);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut r = record();
        r.start_attempt();
        r.mark_failed("exhausted");
        assert_eq!(r.state, TaskState::Failed);

        // Everything after a terminal transition is a no-op.
        r.start_attempt();
        r.mark_succeeded(Payload::new());
        r.mark_cancelled();
        r.set_progress(50);
        assert_eq!(r.state, TaskState::Failed);
        assert_eq!(r.attempt_count, 1);
        assert_eq!(r.progress, 0);
        assert!(r.output.is_none());
    }

    #[test]
    fn success_records_output_and_full_progress() {
        let mut r = record();
        r.start_attempt();
        r.mark_succeeded(Payload::from_pairs([("path", serde_json::json!("/out/42.png"))]));
        assert_eq!(r.state, TaskState::Succeeded);
        assert_eq!(r.progress, 100);
        assert_eq!(r.output.as_ref().unwrap().get_str("path"), Some("/out/42.png"));
    }

    #[test]
    fn unblock_only_applies_to_blocked() {
        let mut r = TaskRecord::new_blocked(TaskDefinition::new("test"));
        assert_eq!(r.state, TaskState::Blocked);
        r.unblock();
        assert_eq!(r.state, TaskState::Enqueued);

        let mut running = record();
        running.start_attempt();
        running.unblock();
        assert_eq!(running.state, TaskState::Running);
    }

    #[test]
    fn progress_is_clamped() {
        let mut r = record();
        r.start_attempt();
        r.set_progress(250);
        assert_eq!(r.progress, 100);
    }

    #[test]
    fn next_cycle_resets_per_cycle_fields() {
        let mut r = record();
        r.start_attempt();
        r.set_progress(80);
        let eligible = Utc::now() + chrono::Duration::seconds(900);
        r.reset_for_next_cycle(eligible);
        assert_eq!(r.state, TaskState::Enqueued);
        assert_eq!(r.attempt_count, 0);
        assert_eq!(r.progress, 0);
        assert_eq!(r.next_eligible_at, Some(eligible));
        assert_eq!(r.enqueued_at, eligible);
    }

    #[test]
    fn record_serde_roundtrip() {
        let mut r = record();
        r.start_attempt();
        r.schedule_retry(Utc::now(), "transient");
        let s = serde_json::to_string(&r).unwrap();
        let back: TaskRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(back.state, TaskState::Retrying);
        assert_eq!(back.attempt_count, 1);
        assert_eq!(back.last_error.as_deref(), Some("transient"));
    }
}
