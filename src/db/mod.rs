// Database layer - SQLite connection, migrations, track queries

pub mod store;

use rusqlite::{params, Connection, Result, Row};
use std::fmt;
use std::path::Path;

/// Current schema version, recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Artist assigned to freshly imported tracks.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// A binary payload together with its declared MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaBlob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        MediaBlob {
            mime_type: mime_type.into(),
            data,
        }
    }
}

// Payloads can be megabytes; print the size, not the bytes.
impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBlob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Represents a track in the database
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Assigned by the store on first insert, never by the caller.
    pub id: Option<i64>,
    pub title: String,
    pub artist: String,
    /// Immutable once the track is created.
    pub audio: MediaBlob,
    pub cover: Option<MediaBlob>,
    /// Whole seconds, 0 until a probe succeeds.
    pub duration_secs: u32,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl Track {
    /// Build an unsaved track with the import defaults.
    pub fn new(title: impl Into<String>, audio: MediaBlob, created_at: i64) -> Self {
        Track {
            id: None,
            title: title.into(),
            artist: UNKNOWN_ARTIST.to_string(),
            audio,
            cover: None,
            duration_secs: 0,
            created_at,
        }
    }
}

const TRACK_COLUMNS: &str = "id, title, artist, audio_blob, audio_mime, cover_blob, cover_mime,
                             duration_secs, created_at";

fn track_from_row(row: &Row<'_>) -> Result<Track> {
    let cover_blob: Option<Vec<u8>> = row.get(5)?;
    let cover_mime: Option<String> = row.get(6)?;
    let cover = cover_blob.map(|data| MediaBlob {
        mime_type: cover_mime.unwrap_or_default(),
        data,
    });

    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        audio: MediaBlob {
            data: row.get(3)?,
            mime_type: row.get(4)?,
        },
        cover,
        duration_secs: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Database { conn })
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Database { conn })
    }

    /// Run migrations to set up the database schema.
    /// Safe to re-run: tables are only created when missing and rows are never dropped.
    pub fn run_migrations(&self) -> Result<()> {
        let version = self.schema_version()?;

        if version < 1 {
            let migration_001 = include_str!("migrations/001_init.sql");
            self.conn.execute_batch(migration_001)?;
        }

        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(())
    }

    /// Schema version stored in the database file (0 for a fresh file).
    pub fn schema_version(&self) -> Result<i32> {
        self.conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
    }

    /// Insert a track and return its new ID. Any `id` already on the track is ignored.
    pub fn create_track(&self, track: &Track) -> Result<i64> {
        let (cover_blob, cover_mime) = match &track.cover {
            Some(cover) => (Some(&cover.data), Some(&cover.mime_type)),
            None => (None, None),
        };

        self.conn.execute(
            "INSERT INTO tracks (
                title, artist, audio_blob, audio_mime, cover_blob, cover_mime,
                duration_secs, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                track.title,
                track.artist,
                track.audio.data,
                track.audio.mime_type,
                cover_blob,
                cover_mime,
                track.duration_secs,
                track.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Read a track by ID
    pub fn get_track(&self, id: i64) -> Result<Track> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS))?;

        stmt.query_row([id], track_from_row)
    }

    /// Get all tracks in insertion order
    pub fn get_all_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tracks ORDER BY id", TRACK_COLUMNS))?;

        let tracks = stmt.query_map([], track_from_row)?;
        tracks.collect()
    }

    /// Replace every mutable column of an existing track.
    /// Fails when the track has no ID or no row carries that ID.
    pub fn update_track(&self, track: &Track) -> Result<()> {
        // An unsaved track matches no row, same as a stale ID.
        let id = track.id.ok_or(rusqlite::Error::QueryReturnedNoRows)?;

        let (cover_blob, cover_mime) = match &track.cover {
            Some(cover) => (Some(&cover.data), Some(&cover.mime_type)),
            None => (None, None),
        };

        let changed = self.conn.execute(
            "UPDATE tracks SET
                title = ?, artist = ?, audio_blob = ?, audio_mime = ?,
                cover_blob = ?, cover_mime = ?, duration_secs = ?, created_at = ?
             WHERE id = ?",
            params![
                track.title,
                track.artist,
                track.audio.data,
                track.audio.mime_type,
                cover_blob,
                cover_mime,
                track.duration_secs,
                track.created_at,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    /// Delete a track by ID. Deleting a missing ID is not an error.
    pub fn delete_track(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM tracks WHERE id = ?", [id])?;
        Ok(())
    }

    /// Count total tracks
    pub fn count_tracks(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_track() -> Track {
        Track {
            id: None,
            title: "Test Track".to_string(),
            artist: "Test Artist".to_string(),
            audio: MediaBlob::new("audio/mpeg", vec![1, 2, 3, 4]),
            cover: Some(MediaBlob::new("image/jpeg", vec![9, 9])),
            duration_secs: 240,
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_database_creation() {
        let db = Database::new_in_memory().expect("Failed to create in-memory database");
        db.run_migrations().expect("Failed to run migrations");
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        let id = db.create_track(&create_test_track()).unwrap();

        db.run_migrations().unwrap();

        assert_eq!(db.count_tracks().unwrap(), 1);
        assert_eq!(db.get_track(id).unwrap().title, "Test Track");
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("library.sqlite3");

        let id = {
            let db = Database::new(&path).unwrap();
            db.run_migrations().unwrap();
            db.create_track(&create_test_track()).unwrap()
        };

        let db = Database::new(&path).unwrap();
        db.run_migrations().unwrap();
        let tracks = db.get_all_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, Some(id));
    }

    #[test]
    fn test_create_track() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let track = create_test_track();
        let id = db.create_track(&track).expect("Failed to create track");

        assert!(id > 0, "Track ID should be greater than 0");
    }

    #[test]
    fn test_create_ignores_client_id() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let mut track = create_test_track();
        track.id = Some(777);
        let id = db.create_track(&track).unwrap();

        assert_ne!(id, 777);
    }

    #[test]
    fn test_read_track() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let track = create_test_track();
        let id = db.create_track(&track).unwrap();

        let retrieved = db.get_track(id).expect("Failed to get track");

        assert_eq!(retrieved.id, Some(id));
        assert_eq!(retrieved.title, track.title);
        assert_eq!(retrieved.artist, track.artist);
        assert_eq!(retrieved.audio, track.audio);
        assert_eq!(retrieved.cover, track.cover);
        assert_eq!(retrieved.duration_secs, 240);
        assert_eq!(retrieved.created_at, track.created_at);
    }

    #[test]
    fn test_track_without_cover() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let mut track = create_test_track();
        track.cover = None;
        let id = db.create_track(&track).unwrap();

        assert_eq!(db.get_track(id).unwrap().cover, None);
    }

    #[test]
    fn test_update_track() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let id = db.create_track(&create_test_track()).unwrap();

        let mut updated = db.get_track(id).unwrap();
        updated.title = "Updated Title".to_string();
        updated.artist = "Updated Artist".to_string();
        updated.cover = Some(MediaBlob::new("image/png", vec![7; 16]));
        db.update_track(&updated).expect("Failed to update track");

        let retrieved = db.get_track(id).unwrap();
        assert_eq!(retrieved, updated);
    }

    #[test]
    fn test_update_track_requires_id() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let result = db.update_track(&create_test_track());
        assert!(matches!(result, Err(rusqlite::Error::QueryReturnedNoRows)));
    }

    #[test]
    fn test_update_missing_track_fails() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let mut track = create_test_track();
        track.id = Some(42);
        let result = db.update_track(&track);

        assert!(matches!(result, Err(rusqlite::Error::QueryReturnedNoRows)));
        assert_eq!(db.count_tracks().unwrap(), 0);
    }

    #[test]
    fn test_delete_track() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let id = db.create_track(&create_test_track()).unwrap();
        db.delete_track(id).expect("Failed to delete track");

        let result = db.get_track(id);
        assert!(result.is_err(), "Track should not exist after deletion");
    }

    #[test]
    fn test_delete_nonexistent_track() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        assert!(db.delete_track(12345).is_ok());
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let first = db.create_track(&create_test_track()).unwrap();
        let second = db.create_track(&create_test_track()).unwrap();
        db.delete_track(second).unwrap();
        let third = db.create_track(&create_test_track()).unwrap();

        assert!(second > first);
        assert!(third > second, "AUTOINCREMENT must not hand out a deleted ID again");
    }

    #[test]
    fn test_get_all_tracks() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        for title in ["Track 1", "Track 2", "Track 3"] {
            let mut track = create_test_track();
            track.title = title.to_string();
            db.create_track(&track).unwrap();
        }

        let tracks = db.get_all_tracks().unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Track 1", "Track 2", "Track 3"]);
    }

    #[test]
    fn test_count_tracks() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        assert_eq!(db.count_tracks().unwrap(), 0);

        db.create_track(&create_test_track()).unwrap();
        db.create_track(&create_test_track()).unwrap();

        assert_eq!(db.count_tracks().unwrap(), 2);
    }

    #[test]
    fn test_media_blob_debug_hides_bytes() {
        let blob = MediaBlob::new("audio/wav", vec![0u8; 4096]);
        let rendered = format!("{:?}", blob);
        assert!(rendered.contains("len: 4096"));
        assert!(!rendered.contains("0, 0, 0"));
    }
}
