// Import pipeline - turn user-selected files into stored tracks.
// Files are processed one at a time so stored order matches input order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::audio::probe::DurationProbe;
use crate::db::store::TrackStore;
use crate::db::{MediaBlob, Track};
use crate::playback::MediaElement;
use crate::session::Session;

/// A file handed to the importer: its name, the MIME type the host
/// declared for it, and its bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        ImportFile {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a file from disk, declaring its type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(ImportFile {
            name,
            mime_type: mime_type_for(path).to_string(),
            data,
        })
    }

    fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

impl std::fmt::Debug for ImportFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Get MIME type for a media file based on its extension
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("aiff") | Some("aif") => "audio/aiff",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Every regular file under `path`, recursively, sorted by path.
pub fn collect_directory(path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Drop the last extension: a final `.` followed by at least one
/// character, none of which is `/`.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => {
            let ext = &name[dot + 1..];
            if ext.is_empty() || ext.contains('/') {
                name
            } else {
                &name[..dot]
            }
        }
        None => name,
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A file that could not be imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub file_name: String,
    pub error: String,
}

/// Result of importing a batch
#[derive(Debug, Default)]
pub struct ImportReport {
    pub total_files: usize,
    /// IDs of the new tracks, in input order.
    pub imported: Vec<i64>,
    /// Files that were neither audio nor image.
    pub ignored: usize,
    pub failed: Vec<ImportFailure>,
}

pub struct Importer<P: DurationProbe> {
    probe: P,
}

impl<P: DurationProbe> Importer<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Import a batch into the store and append the new tracks to `session`.
    ///
    /// One file failing to persist does not stop the rest of the batch.
    /// If nothing was selected beforehand, the first track is loaded
    /// (not played) once the batch is done.
    pub async fn import_files<S: TrackStore, M: MediaElement>(
        &self,
        session: &mut Session<S, M>,
        files: Vec<ImportFile>,
    ) -> ImportReport {
        let mut report = ImportReport {
            total_files: files.len(),
            ..Default::default()
        };

        let mut audio_files = Vec::new();
        let mut image_files = Vec::new();
        for file in files {
            if file.is_audio() {
                audio_files.push(file);
            } else if file.is_image() {
                image_files.push(file);
            } else {
                tracing::debug!(file = %file.name, mime = %file.mime_type, "ignoring non-media file");
                report.ignored += 1;
            }
        }

        for file in audio_files {
            let base = strip_extension(&file.name).to_string();
            let mut track = Track::new(
                base.clone(),
                MediaBlob::new(file.mime_type, file.data),
                now_millis(),
            );

            if let Some(image) = image_files
                .iter()
                .find(|img| strip_extension(&img.name) == base)
            {
                track.cover = Some(MediaBlob::new(image.mime_type.clone(), image.data.clone()));
            }

            track.duration_secs = self.probe.probe(&track.audio).await;

            match session.store().create(&track).await {
                Ok(id) => {
                    tracing::debug!(id, file = %file.name, duration_secs = track.duration_secs, "track imported");
                    track.id = Some(id);
                    session.append(track);
                    report.imported.push(id);
                }
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "failed to persist imported track");
                    report.failed.push(ImportFailure {
                        file_name: file.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if session.current_index().is_none() && !session.is_empty() {
            session.select(0);
        }

        tracing::info!(
            total = report.total_files,
            imported = report.imported.len(),
            failed = report.failed.len(),
            ignored = report.ignored,
            "import finished"
        );
        report
    }

    /// Import every file under `dir`. Unreadable files are reported as failures.
    pub async fn import_directory<S: TrackStore, M: MediaElement>(
        &self,
        session: &mut Session<S, M>,
        dir: &Path,
    ) -> ImportReport {
        let mut files = Vec::new();
        let mut unreadable = Vec::new();
        for path in collect_directory(dir) {
            match ImportFile::from_path(&path) {
                Ok(file) => files.push(file),
                Err(e) => unreadable.push(ImportFailure {
                    file_name: path.to_string_lossy().to_string(),
                    error: e.to_string(),
                }),
            }
        }

        let mut report = self.import_files(session, files).await;
        report.total_files += unreadable.len();
        report.failed.extend(unreadable);
        report
    }
}
