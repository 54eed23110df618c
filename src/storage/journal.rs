//! File-journal storage backing: one JSON document read into memory on
//! init, mutated in place, flushed atomically (write-temp, then rename) on
//! every write.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::StorageError;
use crate::model::{now_millis, RecordedEntry, RequestRecord, ResponseRecord};

use super::{JournalDocument, Storage};

pub struct JournalStorage {
    path: PathBuf,
    entries: RwLock<Vec<RecordedEntry>>,
    // Serializes read-modify-write mutations; `entries` itself stays readable
    // by concurrent lookups while a mutation is in flight building its new state.
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl JournalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let entries = self.entries.read().await.clone();
        let doc = JournalDocument { entries };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JournalStorage {
    async fn init(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if !bytes.is_empty() => {
                let doc: JournalDocument = serde_json::from_slice(&bytes)?;
                *self.entries.write().await = doc.entries;
            }
            Ok(_) | Err(_) => {
                *self.entries.write().await = Vec::new();
                self.flush().await?;
            }
        }
        Ok(())
    }

    async fn save(
        &self,
        request: RequestRecord,
        response: ResponseRecord,
    ) -> Result<RecordedEntry, StorageError> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        let entry = RecordedEntry {
            id: crate::model::generate_id(),
            request,
            response,
            created_at: now_millis(),
        };
        {
            let mut entries = self.entries.write().await;
            entries.push(entry.clone());
        }
        self.flush().await?;
        Ok(entry)
    }

    async fn find(&self, request: &RequestRecord) -> Result<Option<RecordedEntry>, StorageError> {
        self.ensure_open()?;
        let entries = self.entries.read().await;
        let found = entries
            .iter()
            .filter(|e| e.request.method == request.method && e.request.path == request.path)
            .max_by_key(|e| e.created_at)
            .cloned();
        Ok(found)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RecordedEntry>, StorageError> {
        self.ensure_open()?;
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<RecordedEntry>, StorageError> {
        self.ensure_open()?;
        let mut entries = self.entries.read().await.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        };
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        self.entries.write().await.clear();
        self.flush().await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.ensure_open()?;
        Ok(self.entries.read().await.len())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Body;
    use std::collections::BTreeMap;

    fn sample_request(path: &str) -> RequestRecord {
        RequestRecord {
            method: "GET".to_string(),
            url: path.to_string(),
            path: path.to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Body::Absent,
            id: crate::model::generate_id(),
            captured_at: 0,
        }
    }

    fn sample_response() -> ResponseRecord {
        ResponseRecord {
            status: 200,
            headers: BTreeMap::new(),
            body: Body::Json(serde_json::json!({"ok": true})),
            captured_at: 0,
        }
    }

    #[tokio::test]
    async fn round_trips_through_find_by_id() {
        let dir = std::env::temp_dir().join(format!("mockwire-journal-{}", crate::model::generate_id()));
        let storage = JournalStorage::new(dir.join("db.json"));
        storage.init().await.unwrap();
        let entry = storage
            .save(sample_request("/a"), sample_response())
            .await
            .unwrap();
        let found = storage.find_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(found.request, entry.request);
        assert_eq!(found.response, entry.response);
        storage.clear().await.unwrap();
        assert_eq!(storage.count().await.unwrap(), 0);
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_then_find_by_id_is_none() {
        let dir = std::env::temp_dir().join(format!("mockwire-journal-{}", crate::model::generate_id()));
        let storage = JournalStorage::new(dir.join("db.json"));
        storage.init().await.unwrap();
        let entry = storage
            .save(sample_request("/a"), sample_response())
            .await
            .unwrap();
        assert!(storage.delete(&entry.id).await.unwrap());
        assert!(storage.find_by_id(&entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let dir = std::env::temp_dir().join(format!("mockwire-journal-{}", crate::model::generate_id()));
        let storage = JournalStorage::new(dir.join("db.json"));
        storage.init().await.unwrap();
        storage.close().await.unwrap();
        assert!(matches!(storage.count().await, Err(StorageError::Closed)));
    }
}
