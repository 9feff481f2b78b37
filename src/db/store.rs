//! Async track store used by the session and the importer.
//!
//! Every call is a single SQLite statement in autocommit mode, so each
//! operation is its own transaction. The connection lives behind a mutex and
//! calls run on tokio's blocking pool.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task;

use super::{Database, Track};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("track store unavailable: {0}")]
    Unavailable(String),

    #[error("track store read failed: {0}")]
    ReadFailed(String),

    #[error("track store write failed: {0}")]
    WriteFailed(String),
}

/// Failure of a single blocking store call, before it is classified.
enum CallError {
    Sql(rusqlite::Error),
    Task(String),
}

impl CallError {
    fn into_message(self) -> String {
        match self {
            CallError::Sql(e) => e.to_string(),
            CallError::Task(e) => format!("store task failed: {}", e),
        }
    }
}

/// Durable keyed storage of track records.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Persist a new track and return the ID the store assigned to it.
    async fn create(&self, track: &Track) -> Result<i64, StoreError>;

    /// Every stored track, in insertion order.
    async fn list_all(&self) -> Result<Vec<Track>, StoreError>;

    /// Replace the full record at `track.id`.
    async fn upsert(&self, track: &Track) -> Result<(), StoreError>;

    /// Remove a record. Missing IDs are a no-op.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}

/// [`TrackStore`] backed by a SQLite file.
#[derive(Clone)]
pub struct SqliteTrackStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteTrackStore {
    /// Open (or create) the store at `path` and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("failed to create database directory: {}", e))
                })?;
            }
        }

        let db = Database::new(path)
            .map_err(|e| StoreError::Unavailable(format!("failed to open database: {}", e)))?;
        Self::from_database(db)
    }

    /// In-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Database::new_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("failed to open database: {}", e)))?;
        Self::from_database(db)
    }

    fn from_database(db: Database) -> Result<Self, StoreError> {
        db.run_migrations()
            .map_err(|e| StoreError::Unavailable(format!("failed to run migrations: {}", e)))?;

        tracing::info!(schema_version = super::SCHEMA_VERSION, "track store ready");
        Ok(SqliteTrackStore {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_db<T, F>(&self, op: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            // Statements are atomic, so a poisoned lock still guards a consistent connection.
            let db = db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            op(&db).map_err(CallError::Sql)
        })
        .await
        .map_err(|e| CallError::Task(e.to_string()))?
    }
}

#[async_trait]
impl TrackStore for SqliteTrackStore {
    async fn create(&self, track: &Track) -> Result<i64, StoreError> {
        let track = track.clone();
        self.with_db(move |db| db.create_track(&track))
            .await
            .map_err(|e| StoreError::WriteFailed(e.into_message()))
    }

    async fn list_all(&self) -> Result<Vec<Track>, StoreError> {
        self.with_db(|db| db.get_all_tracks())
            .await
            .map_err(|e| StoreError::ReadFailed(e.into_message()))
    }

    async fn upsert(&self, track: &Track) -> Result<(), StoreError> {
        let Some(id) = track.id else {
            return Err(StoreError::WriteFailed("track has no id".to_string()));
        };

        let track = track.clone();
        self.with_db(move |db| db.update_track(&track))
            .await
            .map_err(|e| match e {
                CallError::Sql(rusqlite::Error::QueryReturnedNoRows) => {
                    StoreError::WriteFailed(format!("no track with id {}", id))
                }
                other => StoreError::WriteFailed(other.into_message()),
            })
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.with_db(move |db| db.delete_track(id))
            .await
            .map_err(|e| StoreError::WriteFailed(e.into_message()))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.with_db(|db| db.count_tracks())
            .await
            .map_err(|e| StoreError::ReadFailed(e.into_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MediaBlob;
    use std::collections::HashSet;

    fn sample_track(title: &str) -> Track {
        Track::new(title, MediaBlob::new("audio/mpeg", vec![1, 2, 3]), 1_000)
    }

    #[tokio::test]
    async fn test_create_returns_distinct_ids() {
        let store = SqliteTrackStore::open_in_memory().unwrap();

        let mut ids = HashSet::new();
        for i in 0..20 {
            let id = store.create(&sample_track(&format!("t{}", i))).await.unwrap();
            assert!(ids.insert(id), "id {} handed out twice", id);
        }
        assert_eq!(store.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_upsert_round_trip() {
        let store = SqliteTrackStore::open_in_memory().unwrap();
        let id = store.create(&sample_track("before")).await.unwrap();

        let mut track = sample_track("after");
        track.id = Some(id);
        track.artist = "Someone".to_string();
        track.cover = Some(MediaBlob::new("image/png", vec![5, 5, 5]));
        track.duration_secs = 93;
        store.upsert(&track).await.unwrap();

        let all = store.list_all().await.unwrap();
        let stored = all.iter().find(|t| t.id == Some(id)).unwrap();
        assert_eq!(stored, &track);
    }

    #[tokio::test]
    async fn test_upsert_without_id_fails() {
        let store = SqliteTrackStore::open_in_memory().unwrap();
        let result = store.upsert(&sample_track("orphan")).await;
        assert!(matches!(result, Err(StoreError::WriteFailed(_))));
    }

    #[tokio::test]
    async fn test_upsert_unknown_id_fails() {
        let store = SqliteTrackStore::open_in_memory().unwrap();

        let mut track = sample_track("ghost");
        track.id = Some(99);
        let err = store.upsert(&track).await.unwrap_err();

        assert!(matches!(err, StoreError::WriteFailed(ref msg) if msg.contains("99")));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_list() {
        let store = SqliteTrackStore::open_in_memory().unwrap();
        let keep = store.create(&sample_track("keep")).await.unwrap();
        let gone = store.create(&sample_track("gone")).await.unwrap();

        store.delete(gone).await.unwrap();

        let ids: Vec<_> = store.list_all().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(keep)]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = SqliteTrackStore::open_in_memory().unwrap();
        store.create(&sample_track("only")).await.unwrap();

        store.delete(4242).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_all_empty() {
        let store = SqliteTrackStore::open_in_memory().unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("my-media-player-db.sqlite3");

        let store = SqliteTrackStore::open(&path).unwrap();
        store.create(&sample_track("persisted")).await.unwrap();
        drop(store);

        let reopened = SqliteTrackStore::open(&path).unwrap();
        let tracks = reopened.list_all().await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "persisted");
    }

    #[test]
    fn test_open_unusable_path_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        let result = SqliteTrackStore::open(dir.path());
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
