// Playback binder - projects the current track onto a media element and the
// now-playing display, and turns element signals into progress updates.

pub mod decoder_element;
pub mod object_url;

use crate::db::{Track, UNKNOWN_ARTIST};
use object_url::{ObjectUrls, UrlLease};

/// Title shown while no track is bound.
pub const NO_SONG_SELECTED: &str = "No song selected";

/// The native playback surface (an `<audio>` element in a browser).
pub trait MediaElement {
    /// Bind a new source URL (or none). Binding pauses the element.
    fn set_source(&mut self, url: Option<&str>);
    fn source(&self) -> Option<&str>;
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    /// Playback position in seconds.
    fn current_time(&self) -> f64;
    /// Total duration in seconds, `None` while unknown.
    fn duration(&self) -> Option<f64>;
    fn set_current_time(&mut self, secs: f64);
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
}

/// Signals raised by a media element while it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    TimeUpdate,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cover {
    /// Object URL of the track's own cover image.
    Url(String),
    /// Path of the fallback image.
    Default(String),
}

/// What the now-playing panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub duration_label: String,
    pub cover: Cover,
}

impl NowPlaying {
    fn placeholder(default_cover: &str) -> Self {
        NowPlaying {
            title: NO_SONG_SELECTED.to_string(),
            artist: String::new(),
            duration_label: format_time(0),
            cover: Cover::Default(default_cover.to_string()),
        }
    }
}

/// Progress readout computed on every position update.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub elapsed_secs: u64,
    pub elapsed_label: String,
    /// Position as a percentage of the duration, 0 to 100.
    pub percent: f64,
}

/// Format whole seconds as `m:ss`.
pub fn format_time(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Binds one track at a time to a media element.
///
/// Owns the object URLs of the bound track: the audio URL and, if the track
/// has a cover, the cover URL. Both are revoked before anything new is bound.
pub struct PlaybackBinder<M: MediaElement> {
    element: M,
    urls: ObjectUrls,
    default_cover: String,
    audio_url: Option<UrlLease>,
    cover_url: Option<UrlLease>,
    now_playing: NowPlaying,
}

impl<M: MediaElement> PlaybackBinder<M> {
    pub fn new(element: M, urls: ObjectUrls, default_cover: impl Into<String>) -> Self {
        let default_cover = default_cover.into();
        let now_playing = NowPlaying::placeholder(&default_cover);
        Self {
            element,
            urls,
            default_cover,
            audio_url: None,
            cover_url: None,
            now_playing,
        }
    }

    /// Load `track` into the element without starting playback.
    pub fn bind(&mut self, track: &Track) {
        self.element.set_source(None);
        self.audio_url = None;

        let lease = self.urls.lease(track.audio.clone());
        self.element.set_source(Some(lease.url()));
        self.audio_url = Some(lease);

        self.refresh_display(track);
    }

    /// Update title, artist, duration and cover without touching the source.
    pub fn refresh_display(&mut self, track: &Track) {
        self.cover_url = None;
        let cover = match &track.cover {
            Some(blob) => {
                let lease = self.urls.lease(blob.clone());
                let url = lease.url().to_string();
                self.cover_url = Some(lease);
                Cover::Url(url)
            }
            None => Cover::Default(self.default_cover.clone()),
        };

        let artist = if track.artist.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            track.artist.clone()
        };

        self.now_playing = NowPlaying {
            title: track.title.clone(),
            artist,
            duration_label: format_time(track.duration_secs as u64),
            cover,
        };
    }

    /// Stop, unbind the source and show the placeholder.
    pub fn clear(&mut self) {
        self.element.pause();
        self.element.set_source(None);
        self.audio_url = None;
        self.cover_url = None;
        self.now_playing = NowPlaying::placeholder(&self.default_cover);
    }

    /// Start playback. Returns false when no source is bound.
    pub fn play(&mut self) -> bool {
        if self.element.source().is_none() {
            return false;
        }
        self.element.play();
        true
    }

    pub fn pause(&mut self) {
        self.element.pause();
    }

    pub fn is_playing(&self) -> bool {
        self.element.source().is_some() && !self.element.is_paused()
    }

    pub fn is_bound(&self) -> bool {
        self.audio_url.is_some()
    }

    /// Progress for the current position, or `None` while the duration is unknown.
    pub fn on_time_update(&self) -> Option<Progress> {
        let duration = self.element.duration().filter(|d| d.is_finite() && *d > 0.0)?;
        let position = self.element.current_time().max(0.0);
        let elapsed_secs = position.floor() as u64;

        Some(Progress {
            elapsed_secs,
            elapsed_label: format_time(elapsed_secs),
            percent: (position / duration * 100.0).clamp(0.0, 100.0),
        })
    }

    /// Jump to `percent` (0 to 100) of the duration. No-op while the duration is unknown.
    pub fn seek(&mut self, percent: f64) {
        let Some(duration) = self.element.duration().filter(|d| d.is_finite()) else {
            return;
        };
        if !percent.is_finite() {
            return;
        }
        let target = percent.clamp(0.0, 100.0) / 100.0 * duration;
        self.element.set_current_time(target);
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        self.element.set_volume(volume);
    }

    pub fn now_playing(&self) -> &NowPlaying {
        &self.now_playing
    }

    pub fn element(&self) -> &M {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut M {
        &mut self.element
    }

    pub fn urls(&self) -> &ObjectUrls {
        &self.urls
    }
}
