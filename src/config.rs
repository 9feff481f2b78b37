// Library configuration, loaded from an optional JSON file.
// Every field has a default so a missing file or a partial file both work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the local persistent store.
pub const DEFAULT_DB_NAME: &str = "my-media-player-db";

/// Fallback cover image shown for tracks without artwork.
pub const DEFAULT_COVER: &str = "images/icon-192.png";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory holding the database file.
    pub data_dir: PathBuf,
    pub db_name: String,
    /// Upper bound on a single duration probe; 0 waits forever.
    pub probe_timeout_secs: u64,
    pub default_cover: String,
    pub initial_volume: f32,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        LibraryConfig {
            data_dir: PathBuf::from("."),
            db_name: DEFAULT_DB_NAME.to_string(),
            probe_timeout_secs: 10,
            default_cover: DEFAULT_COVER.to_string(),
            initial_volume: 1.0,
        }
    }
}

impl LibraryConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Full path of the SQLite file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", self.db_name))
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        match self.probe_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = LibraryConfig::default();
        assert_eq!(config.db_path(), PathBuf::from("./my-media-player-db.sqlite3"));
        assert_eq!(config.probe_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.default_cover, "images/icon-192.png");
        assert_eq!(config.initial_volume, 1.0);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, LibraryConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "data_dir": "/var/lib/player", "probe_timeout_secs": 0 }"#).unwrap();

        let config = LibraryConfig::load(&path).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/player"));
        assert_eq!(config.probe_timeout(), None);
        assert_eq!(config.db_name, DEFAULT_DB_NAME);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = LibraryConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
