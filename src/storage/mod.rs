//! Storage contract shared by both backings.
//!
//! Both the file-journal and the embedded-sqlite backing implement the same
//! trait; neither leaks backend-specific capabilities (e.g. journal's raw
//! document shape) into the dispatcher. `search`/`range` from the optional
//! part of the contract are intentionally not modeled as trait methods —
//! nothing in the engine or admin plane consumes them, so adding them now
//! would be speculative surface with no caller.

pub mod journal;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{RecordedEntry, RequestRecord, ResponseRecord};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn init(&self) -> Result<(), StorageError>;
    async fn save(
        &self,
        request: RequestRecord,
        response: ResponseRecord,
    ) -> Result<RecordedEntry, StorageError>;
    async fn find(&self, request: &RequestRecord) -> Result<Option<RecordedEntry>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<RecordedEntry>, StorageError>;
    /// Most-recent-first; consumed by the approximate matcher and the admin plane.
    async fn list(&self) -> Result<Vec<RecordedEntry>, StorageError>;
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;
    async fn clear(&self) -> Result<(), StorageError>;
    async fn count(&self) -> Result<usize, StorageError>;
    async fn close(&self) -> Result<(), StorageError>;
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
pub struct JournalDocument {
    pub entries: Vec<RecordedEntry>,
}

/// Serializes every entry currently in storage into the `{entries: [...]}`
/// document shape shared with the file-journal backing, for the CLI's
/// `export` subcommand.
pub async fn export_json(storage: &dyn Storage) -> Result<Vec<u8>, StorageError> {
    let entries = storage.list().await?;
    let doc = JournalDocument { entries };
    Ok(serde_json::to_vec_pretty(&doc)?)
}

/// Replays a previously exported document into storage via `save`, for the
/// CLI's `import` subcommand. Returns the number of entries imported.
pub async fn import_json(storage: &dyn Storage, bytes: &[u8]) -> Result<usize, StorageError> {
    let doc: JournalDocument = serde_json::from_slice(bytes)?;
    let count = doc.entries.len();
    for entry in doc.entries {
        storage.save(entry.request, entry.response).await?;
    }
    Ok(count)
}
