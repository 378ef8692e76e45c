use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{tables, InsertOutcome};
use crate::error::{AppError, Result};
use crate::models::{DeletionRequest, DeletionRequestRecord, StatusCounts};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Database handle type (Arc-wrapped for sharing across handlers)
pub type Db = Arc<Database>;

/// Deletion request store backed by a local redb file
///
/// redb serializes write transactions, so every check-then-write below
/// runs as one atomic unit.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Db,
    path: PathBuf,
}

/// Open or create the redb database at the given path
///
/// Creates all required tables on first run.
pub fn open_database(path: impl AsRef<Path>) -> Result<Db> {
    tracing::info!("Opening database at: {:?}", path.as_ref());

    // Create parent directory if it doesn't exist
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!("Failed to create database directory: {}", e);
                AppError::Database(redb::Error::Io(e))
            })?;
        }
    }

    let db = Database::create(path)?;

    // Initialize tables on first run
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(tables::DELETION_REQUESTS)?;
        let _ = write_txn.open_table(tables::PENDING_BY_USER)?;
    }
    write_txn.commit()?;

    tracing::info!("Database initialized successfully");

    Ok(Arc::new(db))
}

fn encode_request(request: &DeletionRequest) -> Result<Vec<u8>> {
    let record = DeletionRequestRecord::from(request);
    Ok(bincode::serde::encode_to_vec(&record, BINCODE_CONFIG)?)
}

fn decode_request(bytes: &[u8]) -> Result<DeletionRequest> {
    let (record, _): (DeletionRequestRecord, _) =
        bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
    DeletionRequest::try_from(record)
}

/// Load a request by id; a dangling id means the pending index is out of sync
fn load_request(
    requests: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<DeletionRequest> {
    let guard = requests
        .get(id)?
        .ok_or_else(|| AppError::CorruptRecord(format!("missing deletion request {}", id)))?;
    decode_request(guard.value())
}

impl EmbeddedStore {
    /// Open the store at `path`, creating the file and tables if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = open_database(path.as_ref())?;
        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Size of the database file on disk
    pub fn size_on_disk(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Insert a pending request unless the user already has one
    pub async fn insert_pending(&self, user_id: &str, now: DateTime<Utc>) -> Result<InsertOutcome> {
        let db = self.db.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<InsertOutcome> {
            let write_txn = db.begin_write()?;
            let outcome = {
                let mut pending = write_txn.open_table(tables::PENDING_BY_USER)?;
                let mut requests = write_txn.open_table(tables::DELETION_REQUESTS)?;

                let existing_id = pending
                    .get(user_id.as_str())?
                    .map(|id| id.value().to_string());

                match existing_id {
                    Some(id) => InsertOutcome::AlreadyPending(load_request(&requests, &id)?),
                    None => {
                        let request = DeletionRequest::new_pending(&user_id, now);
                        let id = request.id.to_string();
                        let bytes = encode_request(&request)?;
                        requests.insert(id.as_str(), bytes.as_slice())?;
                        pending.insert(user_id.as_str(), id.as_str())?;
                        InsertOutcome::Created(request)
                    }
                }
            };

            match outcome {
                InsertOutcome::Created(_) => write_txn.commit()?,
                InsertOutcome::AlreadyPending(_) => write_txn.abort()?,
            }

            Ok(outcome)
        })
        .await?
    }

    /// Move the user's pending request to cancelled, if there is one
    pub async fn cancel_pending(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeletionRequest>> {
        let db = self.db.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<DeletionRequest>> {
            let write_txn = db.begin_write()?;
            let cancelled = {
                let mut pending = write_txn.open_table(tables::PENDING_BY_USER)?;
                let mut requests = write_txn.open_table(tables::DELETION_REQUESTS)?;

                let pending_id = pending
                    .get(user_id.as_str())?
                    .map(|id| id.value().to_string());

                match pending_id {
                    None => None,
                    Some(id) => {
                        let mut request = load_request(&requests, &id)?;
                        if !request.is_pending() {
                            return Err(AppError::CorruptRecord(format!(
                                "indexed request {} is {}",
                                id,
                                request.status.as_str()
                            )));
                        }
                        request.cancel(now);
                        let bytes = encode_request(&request)?;
                        requests.insert(id.as_str(), bytes.as_slice())?;
                        pending.remove(user_id.as_str())?;
                        Some(request)
                    }
                }
            };

            if cancelled.is_some() {
                write_txn.commit()?;
            } else {
                write_txn.abort()?;
            }

            Ok(cancelled)
        })
        .await?
    }

    /// The user's pending request, if any
    pub async fn find_pending(&self, user_id: &str) -> Result<Option<DeletionRequest>> {
        let db = self.db.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<DeletionRequest>> {
            let read_txn = db.begin_read()?;
            let pending = read_txn.open_table(tables::PENDING_BY_USER)?;
            let requests = read_txn.open_table(tables::DELETION_REQUESTS)?;

            let pending_id = pending
                .get(user_id.as_str())?
                .map(|id| id.value().to_string());

            pending_id
                .map(|id| load_request(&requests, &id))
                .transpose()
        })
        .await?
    }

    /// Complete every pending request whose deadline is at or before `now`
    pub async fn complete_due(&self, now: DateTime<Utc>) -> Result<Vec<DeletionRequest>> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<DeletionRequest>> {
            let write_txn = db.begin_write()?;
            let mut completed = Vec::new();
            {
                let mut pending = write_txn.open_table(tables::PENDING_BY_USER)?;
                let mut requests = write_txn.open_table(tables::DELETION_REQUESTS)?;

                let mut entries = Vec::new();
                for entry in pending.iter()? {
                    let (user_id, id) = entry?;
                    entries.push((user_id.value().to_string(), id.value().to_string()));
                }

                for (user_id, id) in entries {
                    let mut request = load_request(&requests, &id)?;
                    if !request.is_due(now) {
                        continue;
                    }
                    request.complete(now);
                    let bytes = encode_request(&request)?;
                    requests.insert(id.as_str(), bytes.as_slice())?;
                    pending.remove(user_id.as_str())?;
                    completed.push(request);
                }
            }
            write_txn.commit()?;

            Ok(completed)
        })
        .await?
    }

    /// Number of stored requests per status
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<StatusCounts> {
            let read_txn = db.begin_read()?;
            let requests = read_txn.open_table(tables::DELETION_REQUESTS)?;

            let mut counts = StatusCounts::default();
            for entry in requests.iter()? {
                let (_, bytes) = entry?;
                counts.add(decode_request(bytes.value())?.status);
            }

            Ok(counts)
        })
        .await?
    }

    /// Check the database can start a read transaction
    pub async fn ping(&self) -> Result<()> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            db.begin_read()?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::models::{storage_time, DeletionStatus};

    fn open_test_store() -> (TempDir, EmbeddedStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = EmbeddedStore::open(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("test.db");

        let store = EmbeddedStore::open(&path).unwrap();

        assert!(path.exists());
        assert!(store.size_on_disk() > 0);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_pending_then_conflict() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());

        let first = match store.insert_pending("u1", now).await.unwrap() {
            InsertOutcome::Created(request) => request,
            other => panic!("expected Created, got {:?}", other),
        };

        match store.insert_pending("u1", now).await.unwrap() {
            InsertOutcome::AlreadyPending(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected AlreadyPending, got {:?}", other),
        }

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending_clears_index() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());
        store.insert_pending("u1", now).await.unwrap();

        let cancelled = store.cancel_pending("u1", now).await.unwrap().unwrap();
        assert_eq!(cancelled.status, DeletionStatus::Cancelled);
        assert!(store.find_pending("u1").await.unwrap().is_none());

        // Second cancel finds nothing
        assert!(store.cancel_pending("u1", now).await.unwrap().is_none());

        // The cancelled row is kept
        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.pending, 0);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());
        store.insert_pending("u1", now).await.unwrap();
        store.insert_pending("u2", now).await.unwrap();

        store.cancel_pending("u1", now).await.unwrap();

        assert!(store.find_pending("u1").await.unwrap().is_none());
        assert!(store.find_pending("u2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_due_only_touches_expired_requests() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());
        store
            .insert_pending("old", now - Duration::days(4))
            .await
            .unwrap();
        store.insert_pending("new", now).await.unwrap();
        store
            .insert_pending("gone", now - Duration::days(5))
            .await
            .unwrap();
        store.cancel_pending("gone", now).await.unwrap();

        let completed = store.complete_due(now).await.unwrap();

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].user_id, "old");
        assert_eq!(completed[0].status, DeletionStatus::Completed);
        assert_eq!(completed[0].completed_at, Some(now));
        assert!(store.find_pending("old").await.unwrap().is_none());
        assert!(store.find_pending("new").await.unwrap().is_some());

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_create_one_pending_row() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_pending("u1", now).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if let InsertOutcome::Created(_) = handle.await.unwrap().unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.status_counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_concurrent_cancels_succeed_once() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());
        store.insert_pending("u1", now).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.cancel_pending("u1", now).await })
            })
            .collect();

        let mut cancelled = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                cancelled += 1;
            }
        }

        assert_eq!(cancelled, 1);
    }
}
