//! Playlist session - the in-memory working set mirroring the track store,
//! the current selection, and the playback binder that follows it.
//!
//! Every mutation goes to the store first. The working set is only touched
//! after the store call succeeds, so a failed operation leaves the session
//! exactly as it was.

use thiserror::Error;

use crate::audio::decoder::AudioChunk;
use crate::db::store::{StoreError, TrackStore};
use crate::db::{MediaBlob, Track};
use crate::playback::decoder_element::DecoderElement;
use crate::playback::{format_time, MediaElement, MediaEvent, PlaybackBinder, Progress};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load tracks: {0}")]
    ReadFailed(#[source] StoreError),

    #[error("failed to update track {id}: {source}")]
    UpdateFailed {
        id: i64,
        #[source]
        source: StoreError,
    },

    #[error("failed to remove track {id}: {source}")]
    RemovalFailed {
        id: i64,
        #[source]
        source: StoreError,
    },

    #[error("no track at index {0}")]
    IndexOutOfRange(usize),
}

/// Fields to change on a track. Empty or absent text keeps the old value;
/// the cover is only replaced when a new one is given.
#[derive(Debug, Clone, Default)]
pub struct MetadataEdit {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub cover: Option<MediaBlob>,
}

impl MetadataEdit {
    fn apply_to(&self, track: &mut Track) {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            track.title = title.to_string();
        }
        if let Some(artist) = self.artist.as_deref().filter(|a| !a.is_empty()) {
            track.artist = artist.to_string();
        }
        if let Some(cover) = &self.cover {
            track.cover = Some(cover.clone());
        }
    }
}

/// One line of the rendered playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRow {
    pub index: usize,
    pub title: String,
    pub artist: String,
    pub duration_label: String,
    pub active: bool,
}

pub struct Session<S: TrackStore, M: MediaElement> {
    store: S,
    binder: PlaybackBinder<M>,
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl<S: TrackStore, M: MediaElement> Session<S, M> {
    /// Empty session; nothing is read from the store.
    pub fn new(store: S, binder: PlaybackBinder<M>) -> Self {
        Self {
            store,
            binder,
            tracks: Vec::new(),
            current: None,
        }
    }

    /// Load every stored track and select the first one.
    pub async fn restore(store: S, binder: PlaybackBinder<M>) -> Result<Self, SessionError> {
        let tracks = store.list_all().await.map_err(SessionError::ReadFailed)?;
        tracing::info!(tracks = tracks.len(), "session restored");

        let mut session = Self {
            store,
            binder,
            tracks,
            current: None,
        };
        session.select(0);
        Ok(session)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn binder(&self) -> &PlaybackBinder<M> {
        &self.binder
    }

    pub fn binder_mut(&mut self) -> &mut PlaybackBinder<M> {
        &mut self.binder
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    pub fn is_playing(&self) -> bool {
        self.binder.is_playing()
    }

    /// Add a track that the store has already persisted.
    pub(crate) fn append(&mut self, track: Track) {
        debug_assert!(track.id.is_some(), "only persisted tracks join the working set");
        self.tracks.push(track);
    }

    /// Make `index` current and load it, without playing.
    /// Returns false (and changes nothing) when `index` is out of range.
    pub fn select(&mut self, index: usize) -> bool {
        let Some(track) = self.tracks.get(index) else {
            return false;
        };
        self.binder.bind(track);
        self.current = Some(index);
        true
    }

    /// Index `offset` steps away from the current one, wrapping around.
    /// No selection counts as position -1.
    fn wrapped(&self, offset: i64) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let len = self.tracks.len() as i64;
        let from = self.current.map(|i| i as i64).unwrap_or(-1);
        Some((from + offset).rem_euclid(len) as usize)
    }

    /// Select the following track, wrapping to the start.
    pub fn next(&mut self) -> bool {
        match self.wrapped(1) {
            Some(index) => self.select(index),
            None => false,
        }
    }

    /// Select the preceding track, wrapping to the end.
    pub fn previous(&mut self) -> bool {
        match self.wrapped(-1) {
            Some(index) => self.select(index),
            None => false,
        }
    }

    pub fn play(&mut self) -> bool {
        self.binder.play()
    }

    pub fn pause(&mut self) {
        self.binder.pause();
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.binder.is_playing() {
            self.binder.pause();
            false
        } else {
            self.binder.play()
        }
    }

    /// Select and immediately play `index`, as a playlist click does.
    pub fn play_index(&mut self, index: usize) -> bool {
        self.select(index) && self.binder.play()
    }

    pub fn skip_next(&mut self) -> bool {
        self.next() && self.binder.play()
    }

    pub fn skip_previous(&mut self) -> bool {
        self.previous() && self.binder.play()
    }

    pub fn seek(&mut self, percent: f64) {
        self.binder.seek(percent);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.binder.set_volume(volume);
    }

    /// React to a signal from the media element.
    pub fn on_media_event(&mut self, event: MediaEvent) -> Option<Progress> {
        match event {
            MediaEvent::TimeUpdate => self.binder.on_time_update(),
            MediaEvent::Ended => {
                if self.next() {
                    self.binder.play();
                }
                None
            }
        }
    }

    /// Delete the track at `index` from the store, then from the working set.
    pub async fn remove(&mut self, index: usize) -> Result<(), SessionError> {
        let track = self
            .tracks
            .get(index)
            .ok_or(SessionError::IndexOutOfRange(index))?;
        let id = track
            .id
            .ok_or(SessionError::IndexOutOfRange(index))?;

        if let Err(source) = self.store.delete(id).await {
            tracing::warn!(id, error = %source, "track removal failed");
            return Err(SessionError::RemovalFailed { id, source });
        }

        self.tracks.remove(index);
        tracing::debug!(id, remaining = self.tracks.len(), "track removed");

        if self.tracks.is_empty() {
            self.current = None;
            self.binder.clear();
        } else {
            let next = index.min(self.tracks.len() - 1);
            self.select(next);
        }
        Ok(())
    }

    /// Remove whatever is selected. Does nothing when nothing is.
    pub async fn remove_current(&mut self) -> Result<(), SessionError> {
        match self.current {
            Some(index) => self.remove(index).await,
            None => Ok(()),
        }
    }

    /// Apply `edit` to the track at `index` and persist the full record.
    pub async fn edit_metadata(
        &mut self,
        index: usize,
        edit: MetadataEdit,
    ) -> Result<(), SessionError> {
        let original = self
            .tracks
            .get(index)
            .ok_or(SessionError::IndexOutOfRange(index))?;

        let mut updated = original.clone();
        edit.apply_to(&mut updated);
        let id = updated.id.unwrap_or_default();

        if let Err(source) = self.store.upsert(&updated).await {
            tracing::warn!(id, error = %source, "track update failed");
            return Err(SessionError::UpdateFailed { id, source });
        }

        if self.current == Some(index) {
            self.binder.refresh_display(&updated);
        }
        self.tracks[index] = updated;
        Ok(())
    }

    /// Rows for the playlist view, in working-set order.
    pub fn playlist_rows(&self) -> Vec<PlaylistRow> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(index, track)| PlaylistRow {
                index,
                title: track.title.clone(),
                artist: track.artist.clone(),
                duration_label: format_time(track.duration_secs as u64),
                active: self.current == Some(index),
            })
            .collect()
    }
}

impl<S: TrackStore> Session<S, DecoderElement> {
    /// Decode the next chunk of the bound track and route its signal.
    /// Returns the PCM to hand to the output device along with any progress readout.
    pub fn pump(&mut self) -> Result<Option<(AudioChunk, Option<Progress>)>, String> {
        let Some(pumped) = self.binder.element_mut().pump()? else {
            return Ok(None);
        };
        let progress = self.on_media_event(pumped.event);
        Ok(Some((pumped.chunk, progress)))
    }
}
