//! Executor registry: task kind → executor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::SchedulerError;
use crate::ports::TaskExecutor;

/// Registry of executors, keyed by the task `kind` they handle.
///
/// Design:
/// - Built during initialization (mutable), then frozen behind an `Arc`
///   for the dispatch loop. No locks at runtime.
/// - Registering the same kind twice is an error; submission of an
///   unregistered kind is rejected up front, so the dispatch loop never
///   discovers a missing executor mid-flight.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        kind: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<(), SchedulerError> {
        let kind = kind.into();
        if self.executors.contains_key(&kind) {
            return Err(SchedulerError::DuplicateExecutor(kind));
        }
        self.executors.insert(kind, executor);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.executors.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ExecutionOutcome, ProgressReporter, StopSignal};
    use async_trait::async_trait;

    struct NullExecutor;

    #[async_trait]
    impl TaskExecutor for NullExecutor {
        async fn run(
            &self,
            _input: &crate::domain::Payload,
            _progress: ProgressReporter,
            _stop: StopSignal,
        ) -> ExecutionOutcome {
            ExecutionOutcome::Success(crate::domain::Payload::new())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ExecutorRegistry::new();
        reg.register("image.resize", Arc::new(NullExecutor)).unwrap();

        assert!(reg.contains("image.resize"));
        assert!(reg.get("image.resize").is_some());
        assert!(reg.get("unknown").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = ExecutorRegistry::new();
        reg.register("k", Arc::new(NullExecutor)).unwrap();
        let err = reg.register("k", Arc::new(NullExecutor)).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateExecutor(kind) if kind == "k"));
    }
}
