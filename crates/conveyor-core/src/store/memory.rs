//! In-memory task store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{SchedulerError, TaskId, TaskRecord, TaskState};
use crate::ports::TaskStore;

/// HashMap-backed store. No durability; for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn put(&self, record: TaskRecord) -> Result<(), SchedulerError> {
        self.records.lock().await.insert(record.id(), record);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<TaskRecord, SchedulerError> {
        self.records
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::NotFound(id))
    }

    async fn list_by_state(&self, state: TaskState) -> Result<Vec<TaskRecord>, SchedulerError> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        id: TaskId,
        mutation: Box<dyn for<'a> FnOnce(&'a mut TaskRecord) + Send>,
    ) -> Result<TaskRecord, SchedulerError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(SchedulerError::NotFound(id))?;
        mutation(record);
        Ok(record.clone())
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskDefinition;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskDefinition::new("test"))
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryStore::new();
        let r = record();
        let id = r.id();
        store.put(r).await.unwrap();

        let got = store.get(id).await.unwrap();
        assert_eq!(got.id(), id);
        assert_eq!(got.state, TaskState::Enqueued);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = MemoryStore::new();
        let id = TaskId::generate();
        assert!(matches!(
            store.get(id).await,
            Err(SchedulerError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn update_applies_mutation() {
        let store = MemoryStore::new();
        let r = record();
        let id = r.id();
        store.put(r).await.unwrap();

        let updated = store
            .update(id, Box::new(|r| r.start_attempt()))
            .await
            .unwrap();
        assert_eq!(updated.state, TaskState::Running);
        assert_eq!(updated.attempt_count, 1);

        assert_eq!(store.get(id).await.unwrap().state, TaskState::Running);
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(TaskId::generate(), Box::new(|_| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_by_state_filters() {
        let store = MemoryStore::new();
        let enqueued = record();
        let mut running = record();
        running.start_attempt();

        store.put(enqueued).await.unwrap();
        store.put(running).await.unwrap();

        assert_eq!(
            store.list_by_state(TaskState::Enqueued).await.unwrap().len(),
            1
        );
        assert_eq!(
            store.list_by_state(TaskState::Running).await.unwrap().len(),
            1
        );
        assert!(store
            .list_by_state(TaskState::Failed)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.all().await.unwrap().len(), 2);
    }
}
