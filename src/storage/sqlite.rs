//! Embedded relational storage backing via sqlx, one `entries` table with
//! primitive columns plus JSON-encoded query/header/body strings, and
//! write-ahead-logging enabled for concurrent read safety.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::StorageError;
use crate::model::{now_millis, Body, RecordedEntry, RequestRecord, ResponseRecord};

use super::Storage;

pub struct SqliteStorage {
    pool: SqlitePool,
    closed: AtomicBool,
}

impl SqliteStorage {
    pub async fn connect(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(Box::new(e)))?;
        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<RecordedEntry, StorageError> {
        let req_query: String = row.try_get("req_query").map_err(sqlx_err)?;
        let req_headers: String = row.try_get("req_headers").map_err(sqlx_err)?;
        let req_body: String = row.try_get("req_body").map_err(sqlx_err)?;
        let resp_headers: String = row.try_get("resp_headers").map_err(sqlx_err)?;
        let resp_body: String = row.try_get("resp_body").map_err(sqlx_err)?;

        Ok(RecordedEntry {
            id: row.try_get("id").map_err(sqlx_err)?,
            created_at: row.try_get("created_at").map_err(sqlx_err)?,
            request: RequestRecord {
                method: row.try_get("method").map_err(sqlx_err)?,
                url: row.try_get("url").map_err(sqlx_err)?,
                path: row.try_get("path").map_err(sqlx_err)?,
                query: serde_json::from_str(&req_query)?,
                headers: serde_json::from_str(&req_headers)?,
                body: serde_json::from_str::<Body>(&req_body)?,
                id: row.try_get("req_id").map_err(sqlx_err)?,
                captured_at: row.try_get("req_captured_at").map_err(sqlx_err)?,
            },
            response: ResponseRecord {
                status: row.try_get::<i64, _>("status").map_err(sqlx_err)? as u16,
                headers: serde_json::from_str(&resp_headers)?,
                body: serde_json::from_str::<Body>(&resp_body)?,
                captured_at: row.try_get("resp_captured_at").map_err(sqlx_err)?,
            },
        })
    }
}

fn sqlx_err(e: sqlx::Error) -> StorageError {
    StorageError::Backend(Box::new(e))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                url TEXT NOT NULL,
                req_query TEXT NOT NULL,
                req_headers TEXT NOT NULL,
                req_body TEXT NOT NULL,
                req_id TEXT NOT NULL,
                req_captured_at INTEGER NOT NULL,
                status INTEGER NOT NULL,
                resp_headers TEXT NOT NULL,
                resp_body TEXT NOT NULL,
                resp_captured_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_method_path ON entries(method, path)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn save(
        &self,
        request: RequestRecord,
        response: ResponseRecord,
    ) -> Result<RecordedEntry, StorageError> {
        self.ensure_open()?;
        let entry = RecordedEntry {
            id: crate::model::generate_id(),
            request,
            response,
            created_at: now_millis(),
        };
        sqlx::query(
            r#"
            INSERT INTO entries
                (id, method, path, url, req_query, req_headers, req_body, req_id,
                 req_captured_at, status, resp_headers, resp_body, resp_captured_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.request.method)
        .bind(&entry.request.path)
        .bind(&entry.request.url)
        .bind(serde_json::to_string(&entry.request.query)?)
        .bind(serde_json::to_string(&entry.request.headers)?)
        .bind(serde_json::to_string(&entry.request.body)?)
        .bind(&entry.request.id)
        .bind(entry.request.captured_at)
        .bind(entry.response.status as i64)
        .bind(serde_json::to_string(&entry.response.headers)?)
        .bind(serde_json::to_string(&entry.response.body)?)
        .bind(entry.response.captured_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(entry)
    }

    async fn find(&self, request: &RequestRecord) -> Result<Option<RecordedEntry>, StorageError> {
        self.ensure_open()?;
        let row = sqlx::query(
            "SELECT * FROM entries WHERE method = ? AND path = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&request.method)
        .bind(&request.path)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?;
        row.map(|r| Self::row_to_entry(&r)).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RecordedEntry>, StorageError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT * FROM entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.map(|r| Self::row_to_entry(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<RecordedEntry>, StorageError> {
        self.ensure_open()?;
        let rows = sqlx::query("SELECT * FROM entries ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.ensure_open()?;
        let result = sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.ensure_open()?;
        sqlx::query("DELETE FROM entries")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT COUNT(*) as c FROM entries")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let count: i64 = row.try_get("c").map_err(sqlx_err)?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        self.pool.close().await;
        Ok(())
    }
}
