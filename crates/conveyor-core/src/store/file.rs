//! Durable JSON-file task store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{SchedulerError, TaskId, TaskRecord, TaskState};
use crate::ports::TaskStore;

/// File-backed store: the whole record map is written as one JSON
/// snapshot after every mutation.
///
/// Design:
/// - Writes go to `<path>.tmp` first and are renamed over the target, so
///   a crash mid-write leaves the previous snapshot intact.
/// - `open()` loads the snapshot at process start; the scheduler's
///   reload pass then re-admits every non-terminal record.
/// - Record counts here are per-process scheduler workloads, not big
///   data; one file is plenty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<TaskRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| SchedulerError::Store(format!("corrupt snapshot: {e}")))?;
                list.into_iter().map(|r| (r.id(), r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(SchedulerError::Store(format!("read {path:?}: {e}"))),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<TaskId, TaskRecord>) -> Result<(), SchedulerError> {
        let mut list: Vec<&TaskRecord> = records.values().collect();
        list.sort_by_key(|r| r.id());
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| SchedulerError::Store(format!("encode snapshot: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| SchedulerError::Store(format!("write {tmp:?}: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SchedulerError::Store(format!("rename {tmp:?}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn put(&self, record: TaskRecord) -> Result<(), SchedulerError> {
        let mut records = self.records.lock().await;
        records.insert(record.id(), record);
        self.persist(&records).await
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
        let updated = record.clone();
        self.persist(&records).await?;
        Ok(updated)
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}
