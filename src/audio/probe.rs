// Duration probe - best-effort playback length of an audio blob.
// A probe never fails: anything that goes wrong yields 0 seconds.

use async_trait::async_trait;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::io::Cursor;
use std::time::Duration;
use tokio::task;

use super::decoder::read_duration_secs;
use crate::db::MediaBlob;
use crate::playback::object_url::ObjectUrls;

/// Determines the playback duration of an audio payload, in whole seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, audio: &MediaBlob) -> u32;
}

/// Probe that opens a throwaway symphonia decoder over the blob.
pub struct SymphoniaProbe {
    urls: ObjectUrls,
    timeout: Option<Duration>,
}

impl SymphoniaProbe {
    pub fn new(urls: ObjectUrls, timeout: Option<Duration>) -> Self {
        Self { urls, timeout }
    }
}

#[async_trait]
impl DurationProbe for SymphoniaProbe {
    async fn probe(&self, audio: &MediaBlob) -> u32 {
        // Revoked when this function returns, whichever path it takes.
        let lease = self.urls.lease(audio.clone());
        let url = lease.url().to_string();
        let urls = self.urls.clone();

        let work = task::spawn_blocking(move || {
            let blob = urls
                .resolve(&url)
                .ok_or_else(|| format!("object url {} was revoked", url))?;
            measure_duration(&blob)
        });

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(timeout_ms = limit.as_millis() as u64, "duration probe timed out");
                    return 0;
                }
            },
            None => work.await,
        };

        let secs = match outcome {
            Ok(Ok(secs)) => secs,
            Ok(Err(e)) => {
                tracing::debug!(mime = %audio.mime_type, error = %e, "duration probe failed");
                0
            }
            Err(e) => {
                tracing::warn!(error = %e, "duration probe task failed");
                0
            }
        };

        drop(lease);
        secs
    }
}

/// Floor the container-declared duration; fall back to lofty's properties
/// reader for containers that do not declare a frame count.
pub fn measure_duration(blob: &MediaBlob) -> Result<u32, String> {
    match read_duration_secs(blob)? {
        Some(secs) => Ok(floor_secs(secs)),
        None => tagged_duration_secs(blob),
    }
}

/// Duration as reported by the tag reader's audio properties.
fn tagged_duration_secs(blob: &MediaBlob) -> Result<u32, String> {
    let tagged = Probe::new(Cursor::new(blob.data.as_slice()))
        .guess_file_type()
        .map_err(|e| format!("Failed to guess file type: {}", e))?
        .read()
        .map_err(|e| format!("Failed to read file: {}", e))?;

    Ok(tagged.properties().duration().as_secs() as u32)
}

fn floor_secs(secs: f64) -> u32 {
    if secs.is_finite() && secs > 0.0 {
        secs.floor() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_fixtures::wav_blob;

    #[test]
    fn test_floor_secs() {
        assert_eq!(floor_secs(2.99), 2);
        assert_eq!(floor_secs(0.4), 0);
        assert_eq!(floor_secs(f64::NAN), 0);
        assert_eq!(floor_secs(f64::INFINITY), 0);
        assert_eq!(floor_secs(-3.0), 0);
    }

    #[test]
    fn test_measure_wav() {
        assert_eq!(measure_duration(&wav_blob(8000, 3.7)).unwrap(), 3);
    }

    #[test]
    fn test_tagged_duration() {
        assert_eq!(tagged_duration_secs(&wav_blob(8000, 2.5)).unwrap(), 2);
    }

    #[test]
    fn test_tagged_duration_rejects_garbage() {
        let blob = MediaBlob::new("audio/mpeg", b"no tags, no frames".to_vec());
        assert!(tagged_duration_secs(&blob).is_err());
    }

    #[tokio::test]
    async fn test_timed_out_probe_is_zero_and_releases_url() {
        let urls = ObjectUrls::new();
        let probe = SymphoniaProbe::new(urls.clone(), Some(Duration::from_nanos(1)));
        // Large enough that copying it on the blocking pool outlasts the timer.
        let long = wav_blob(44100, 300.0);

        let secs = probe.probe(&long).await;

        assert_eq!(secs, 0);
        assert_eq!(urls.live_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_wav_releases_url() {
        let urls = ObjectUrls::new();
        let probe = SymphoniaProbe::new(urls.clone(), Some(Duration::from_secs(10)));

        let secs = probe.probe(&wav_blob(8000, 2.2)).await;

        assert_eq!(secs, 2);
        assert_eq!(urls.live_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_garbage_is_zero_and_releases_url() {
        let urls = ObjectUrls::new();
        let probe = SymphoniaProbe::new(urls.clone(), None);

        let secs = probe
            .probe(&MediaBlob::new("audio/mpeg", b"not really an mp3".to_vec()))
            .await;

        assert_eq!(secs, 0);
        assert_eq!(urls.live_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_empty_blob_is_zero() {
        let urls = ObjectUrls::new();
        let probe = SymphoniaProbe::new(urls.clone(), None);

        assert_eq!(probe.probe(&MediaBlob::new("audio/ogg", Vec::new())).await, 0);
        assert_eq!(urls.live_count(), 0);
    }
}
