// Modules
pub mod audio;
pub mod config;
pub mod db;
pub mod importer;
pub mod playback;
pub mod session;
pub mod shell;

use std::path::Path;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use audio::probe::SymphoniaProbe;
use config::LibraryConfig;
use db::store::{SqliteTrackStore, StoreError};
use importer::{ImportFile, ImportReport, Importer};
use playback::decoder_element::DecoderElement;
use playback::object_url::ObjectUrls;
use playback::PlaybackBinder;
use session::{Session, SessionError};

/// Failures that stop the player from starting at all.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot open track store: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("cannot restore session: {0}")]
    Restore(#[source] SessionError),
}

/// Install the global subscriber. The filter comes from `LOG_LEVEL`,
/// defaulting to `info`. Later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();
}

/// A running player: session, importer and the URL registry they share.
pub struct App {
    pub session: Session<SqliteTrackStore, DecoderElement>,
    pub importer: Importer<SymphoniaProbe>,
    pub urls: ObjectUrls,
}

impl App {
    pub async fn import_files(&mut self, files: Vec<ImportFile>) -> ImportReport {
        self.importer.import_files(&mut self.session, files).await
    }

    pub async fn import_directory(&mut self, dir: &Path) -> ImportReport {
        self.importer.import_directory(&mut self.session, dir).await
    }
}

/// Open the store named by `config`, restore the saved tracks and bind the
/// first one.
pub async fn launch(config: &LibraryConfig) -> Result<App, StartupError> {
    let db_path = config.db_path();
    tracing::info!(path = %db_path.display(), "opening track store");
    let store = SqliteTrackStore::open(&db_path).map_err(StartupError::StoreUnavailable)?;

    let urls = ObjectUrls::new();
    let element = DecoderElement::new(urls.clone());
    let binder = PlaybackBinder::new(element, urls.clone(), config.default_cover.clone());

    let mut session = Session::restore(store, binder)
        .await
        .map_err(StartupError::Restore)?;
    session.set_volume(config.initial_volume);

    let importer = Importer::new(SymphoniaProbe::new(urls.clone(), config.probe_timeout()));

    Ok(App {
        session,
        importer,
        urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_fixtures::wav_bytes;
    use crate::playback::MediaElement;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> LibraryConfig {
        LibraryConfig {
            data_dir: dir.join("data"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_launch_empty_library() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let app = launch(&config_in(dir.path())).await.unwrap();

        assert!(app.session.is_empty());
        assert_eq!(app.session.current_index(), None);
        assert_eq!(app.session.binder().now_playing().title, "No song selected");
        assert!(dir.path().join("data/my-media-player-db.sqlite3").exists());
    }

    #[tokio::test]
    async fn test_library_survives_relaunch() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig {
            initial_volume: 0.4,
            ..config_in(dir.path())
        };

        {
            let mut app = launch(&config).await.unwrap();
            let report = app
                .import_files(vec![
                    ImportFile::new("first.wav", "audio/wav", wav_bytes(8000, 2.0)),
                    ImportFile::new("second.wav", "audio/wav", wav_bytes(8000, 3.0)),
                ])
                .await;
            assert_eq!(report.imported.len(), 2);
        }

        let app = launch(&config).await.unwrap();
        let titles: Vec<_> = app.session.tracks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(app.session.tracks()[1].duration_secs, 3);
        assert_eq!(app.session.current_index(), Some(0));
        assert_eq!(app.session.binder().element().volume(), 0.4);
        // Only the bound track's audio url is live.
        assert_eq!(app.urls.live_count(), 1);
    }

    #[tokio::test]
    async fn test_unopenable_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        // A directory where the database file should be.
        let config = config_in(dir.path());
        std::fs::create_dir_all(config.db_path()).unwrap();

        let err = launch(&config).await.err().unwrap();
        assert!(matches!(err, StartupError::StoreUnavailable(_)));
    }
}
