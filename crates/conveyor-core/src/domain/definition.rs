//! Task definition: the immutable descriptor a caller submits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constraints::Constraints;
use super::ids::TaskId;
use super::payload::Payload;
use super::retry::RetryPolicy;

/// When and how often a task runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run once, as soon as eligible.
    OneShot,

    /// Re-run after every successful completion. The next cycle becomes
    /// eligible anywhere in the flex window `[interval - flex, interval]`
    /// after the previous run's completion.
    Periodic { interval: Duration, flex: Duration },

    /// Gated on another task: stays blocked until `after` succeeds.
    Chained { after: TaskId },
}

/// Dispatch priority class.
///
/// Expedited and foreground tasks are queued ahead of normal ones when
/// worker slots are scarce; foreground additionally asks the notifier for
/// an ongoing-status affordance before work begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Expedited,
    Foreground,
}

impl Priority {
    /// Urgent classes jump the normal ready queue.
    pub fn is_urgent(self) -> bool {
        matches!(self, Priority::Expedited | Priority::Foreground)
    }
}

/// Immutable descriptor of one schedulable unit of work.
///
/// Built with the `with_*` methods, then handed to `Scheduler::submit`.
/// The `kind` selects which registered executor runs the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub kind: String,

    #[serde(default)]
    pub input: Payload,

    #[serde(default)]
    pub constraints: Constraints,

    #[serde(default)]
    pub retry_policy: RetryPolicy,

    pub schedule: Schedule,

    #[serde(default)]
    pub priority: Priority,
}

impl TaskDefinition {
    /// One-shot task of the given kind with a generated id.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            kind: kind.into(),
            input: Payload::new(),
            constraints: Constraints::none(),
            retry_policy: RetryPolicy::default(),
            schedule: Schedule::OneShot,
            priority: Priority::Normal,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn periodic(mut self, interval: Duration, flex: Duration) -> Self {
        self.schedule = Schedule::Periodic { interval, flex };
        self
    }

    pub fn after(mut self, predecessor: TaskId) -> Self {
        self.schedule = Schedule::Chained { after: predecessor };
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Shape checks that need no scheduler state.
    ///
    /// The scheduler layers on the stateful checks (kind registered, id
    /// unused, predecessor known) at submission.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind.is_empty() {
            return Err("kind must not be empty".to_string());
        }
        match &self.schedule {
            Schedule::OneShot => {}
            Schedule::Periodic { interval, flex } => {
                if interval.is_zero() {
                    return Err("periodic interval must be non-zero".to_string());
                }
                if flex > interval {
                    return Err(format!(
                        "flex window ({flex:?}) must not exceed the interval ({interval:?})"
                    ));
                }
            }
            Schedule::Chained { after } => {
                if *after == self.id {
                    return Err("a task cannot chain after itself".to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let def = TaskDefinition::new("image.resize");
        assert_eq!(def.kind, "image.resize");
        assert_eq!(def.schedule, Schedule::OneShot);
        assert_eq!(def.priority, Priority::Normal);
        assert!(def.constraints.is_empty());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_invalid() {
        let def = TaskDefinition::new("t").periodic(Duration::ZERO, Duration::ZERO);
        assert!(def.validate().is_err());
    }

    #[test]
    fn flex_wider_than_interval_is_invalid() {
        let def =
            TaskDefinition::new("t").periodic(Duration::from_secs(10), Duration::from_secs(20));
        assert!(def.validate().is_err());
    }

    #[test]
    fn self_chain_is_invalid() {
        let id = TaskId::generate();
        let def = TaskDefinition::new("t").with_id(id).after(id);
        assert!(def.validate().is_err());
    }

    #[test]
    fn urgency_classes() {
        assert!(!Priority::Normal.is_urgent());
        assert!(Priority::Expedited.is_urgent());
        assert!(Priority::Foreground.is_urgent());
    }

    #[test]
    fn definition_serde_roundtrip() {
        let def = TaskDefinition::new("image.resize")
            .with_input(Payload::from_pairs([("image_id", serde_json::json!(42))]))
            .with_constraints(Constraints::none().charging())
            .periodic(Duration::from_secs(1200), Duration::from_secs(300));
        let s = serde_json::to_string(&def).unwrap();
        let back: TaskDefinition = serde_json::from_str(&s).unwrap();
        assert_eq!(def, back);
    }
}
