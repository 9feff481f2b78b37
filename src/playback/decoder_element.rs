use crate::audio::decoder::{AudioChunk, AudioDecoder};

use super::object_url::ObjectUrls;
use super::{MediaElement, MediaEvent};

/// Output of one [`DecoderElement::pump`] step.
#[derive(Debug, Clone)]
pub struct Pumped {
    /// Decoded PCM, already scaled by the element volume.
    pub chunk: AudioChunk,
    pub event: MediaEvent,
}

/// Media element that decodes bound blobs with symphonia.
///
/// Sources are object URLs resolved through the shared registry. A source
/// that fails to decode stays bound but never plays, mirroring how a
/// malformed file behaves in a browser audio element.
pub struct DecoderElement {
    urls: ObjectUrls,
    source: Option<String>,
    decoder: Option<AudioDecoder>,
    paused: bool,
    ended: bool,
    volume: f32,
}

impl DecoderElement {
    pub fn new(urls: ObjectUrls) -> Self {
        Self {
            urls,
            source: None,
            decoder: None,
            paused: true,
            ended: false,
            volume: 1.0,
        }
    }

    /// Whether the bound source could be opened for decoding.
    pub fn is_playable(&self) -> bool {
        self.decoder.is_some()
    }

    /// Decode the next chunk while playing. Returns `Ok(None)` when paused or
    /// nothing playable is bound.
    pub fn pump(&mut self) -> Result<Option<Pumped>, String> {
        if self.paused {
            return Ok(None);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        let decoded = decoder.decode_next_chunk();
        self.settle(decoded)
    }

    /// Turn one decode result into a pump step. A decode error stops playback.
    fn settle(&mut self, decoded: Result<AudioChunk, String>) -> Result<Option<Pumped>, String> {
        let mut chunk = match decoded {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(source = ?self.source, error = %e, "playback stopped on decode error");
                self.paused = true;
                return Err(e);
            }
        };

        if chunk.is_end {
            self.paused = true;
            self.ended = true;
            return Ok(Some(Pumped {
                chunk,
                event: MediaEvent::Ended,
            }));
        }

        if self.volume < 1.0 {
            for sample in chunk.samples.iter_mut() {
                *sample *= self.volume;
            }
        }

        Ok(Some(Pumped {
            chunk,
            event: MediaEvent::TimeUpdate,
        }))
    }
}

impl MediaElement for DecoderElement {
    fn set_source(&mut self, url: Option<&str>) {
        self.paused = true;
        self.ended = false;
        self.decoder = None;
        self.source = url.map(str::to_string);

        let Some(url) = url else {
            return;
        };
        let Some(blob) = self.urls.resolve(url) else {
            tracing::warn!(url, "bound source is not a live object url");
            return;
        };

        match AudioDecoder::from_blob(&blob) {
            Ok(decoder) => self.decoder = Some(decoder),
            Err(e) => tracing::warn!(url, error = %e, "bound source cannot be decoded"),
        }
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn play(&mut self) {
        if self.decoder.is_none() {
            tracing::debug!("play requested without a playable source");
            return;
        }
        if self.ended {
            // Playing an ended element starts it over.
            self.set_current_time(0.0);
            self.ended = false;
        }
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn current_time(&self) -> f64 {
        self.decoder
            .as_ref()
            .map(|d| d.current_position_ms() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.decoder
            .as_ref()
            .map(|d| d.duration_ms())
            .filter(|ms| *ms > 0)
            .map(|ms| ms as f64 / 1000.0)
    }

    fn set_current_time(&mut self, secs: f64) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        let position_ms = (secs.max(0.0) * 1000.0) as u64;
        if let Err(e) = decoder.seek(position_ms) {
            tracing::warn!(position_ms, error = %e, "seek failed");
        } else {
            self.ended = false;
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }
}
