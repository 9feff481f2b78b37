use std::io::Cursor;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::db::MediaBlob;

/// PCM audio chunk (f32 samples, interleaved stereo)
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved stereo samples (L, R, L, R, ...) in range [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Current position in milliseconds
    pub position_ms: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// True if this is the last chunk
    pub is_end: bool,
}

/// Format reader and default track of an in-memory payload.
struct OpenedMedia {
    format_reader: Box<dyn FormatReader>,
    track_id: u32,
    sample_rate: u32,
    n_frames: Option<u64>,
}

fn open_blob(blob: &MediaBlob) -> Result<OpenedMedia, String> {
    // The cursor owns a copy of the bytes; dropping the reader releases it.
    let source = Cursor::new(blob.data.clone());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if !blob.mime_type.is_empty() {
        hint.mime_type(&blob.mime_type);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Failed to probe audio format: {}", e))?;

    let format_reader = probed.format;

    // Get the default track (first audio track)
    let track = format_reader
        .default_track()
        .ok_or_else(|| "No audio tracks found".to_string())?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let n_frames = track.codec_params.n_frames;

    Ok(OpenedMedia {
        format_reader,
        track_id,
        sample_rate,
        n_frames,
    })
}

/// Read the duration of an audio payload from its container headers.
/// Returns `Ok(None)` when the container does not declare a frame count.
pub fn read_duration_secs(blob: &MediaBlob) -> Result<Option<f64>, String> {
    let media = open_blob(blob)?;
    if media.sample_rate == 0 {
        return Ok(None);
    }
    Ok(media
        .n_frames
        .map(|frames| frames as f64 / media.sample_rate as f64))
}

/// Audio decoder for streaming playback of an in-memory payload
pub struct AudioDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    duration_ms: u64,
    current_position_ms: u64,
}

impl AudioDecoder {
    /// Create a new audio decoder over the bytes of `blob`
    pub fn from_blob(blob: &MediaBlob) -> Result<Self, String> {
        let media = open_blob(blob)?;

        let track = media
            .format_reader
            .tracks()
            .iter()
            .find(|t| t.id == media.track_id)
            .ok_or_else(|| "No audio tracks found".to_string())?;

        // Create a decoder for the track
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("Failed to create decoder: {}", e))?;

        let duration_ms = match media.n_frames {
            Some(n_frames) if media.sample_rate > 0 => n_frames * 1000 / media.sample_rate as u64,
            _ => 0, // Unknown duration
        };

        Ok(Self {
            format_reader: media.format_reader,
            decoder,
            track_id: media.track_id,
            sample_rate: media.sample_rate,
            duration_ms,
            current_position_ms: 0,
        })
    }

    /// Decode the next chunk of audio.
    /// The final chunk has `is_end` set and carries no samples.
    pub fn decode_next_chunk(&mut self) -> Result<AudioChunk, String> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(AudioChunk {
                        samples: Vec::new(),
                        sample_rate: self.sample_rate,
                        position_ms: self.current_position_ms,
                        duration_ms: self.duration_ms,
                        is_end: true,
                    });
                }
                Err(e) => return Err(format!("Error reading packet: {}", e)),
            };

            // Skip packets that don't belong to our track
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::warn!(error = msg, "skipping corrupted packet");
                    // Reset decoder state after error to avoid cascading errors
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(format!("Decode error: {}", e)),
            };

            let samples = convert_to_stereo_f32(&decoded);

            // Update position based on packet timestamp
            if let Some(tb) = self.decoder.codec_params().time_base {
                let time = tb.calc_time(packet.ts());
                self.current_position_ms = time.seconds * 1000 + (time.frac * 1000.0) as u64;
            }

            return Ok(AudioChunk {
                samples,
                sample_rate: self.sample_rate,
                position_ms: self.current_position_ms,
                duration_ms: self.duration_ms,
                is_end: false,
            });
        }
    }

    /// Seek to a specific time position in milliseconds
    pub fn seek(&mut self, position_ms: u64) -> Result<(), String> {
        // Leave a small margin before the end to avoid "end of stream" errors
        let clamped_position = if self.duration_ms > 0 {
            let margin_ms = 100;
            position_ms.min(self.duration_ms.saturating_sub(margin_ms))
        } else {
            position_ms
        };
        tracing::debug!(
            requested_ms = position_ms,
            duration_ms = self.duration_ms,
            clamped_ms = clamped_position,
            "seeking"
        );

        // Time::from(u64) treats the value as seconds, so split it manually
        let time = Time {
            seconds: clamped_position / 1000,
            frac: (clamped_position % 1000) as f64 / 1000.0,
        };

        self.format_reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| {
                tracing::warn!(position_ms = clamped_position, error = %e, "seek failed");
                format!("Seek error: {}", e)
            })?;

        // Reset decoder state after seek so the first packet decodes cleanly
        self.decoder.reset();

        self.current_position_ms = clamped_position;
        Ok(())
    }

    /// Get current playback position in milliseconds
    pub fn current_position_ms(&self) -> u64 {
        self.current_position_ms
    }

    /// Get total duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Convert decoded audio buffer to interleaved stereo f32 samples
fn convert_to_stereo_f32(decoded: &AudioBufferRef) -> Vec<f32> {
    match decoded {
        AudioBufferRef::F32(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::U8(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::U16(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::U24(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::U32(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::S8(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::S16(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::S24(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::S32(buf) => convert_buffer_to_f32(buf),
        AudioBufferRef::F64(buf) => convert_buffer_to_f32(buf),
    }
}

/// Generic converter for any sample format to interleaved stereo f32
fn convert_buffer_to_f32<S>(buf: &symphonia::core::audio::AudioBuffer<S>) -> Vec<f32>
where
    S: symphonia::core::sample::Sample,
    f32: FromSample<S>,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();

    if channels == 1 {
        // Mono: duplicate to stereo
        let mono = buf.chan(0);
        let mut stereo = Vec::with_capacity(frames * 2);
        for &sample in mono {
            let f = f32::from_sample(sample);
            stereo.push(f);
            stereo.push(f);
        }
        stereo
    } else if channels >= 2 {
        // Stereo or more: take first two channels
        let left = buf.chan(0);
        let right = buf.chan(1);
        let mut stereo = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            stereo.push(f32::from_sample(left[i]));
            stereo.push(f32::from_sample(right[i]));
        }
        stereo
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_fixtures::wav_blob;

    #[test]
    fn test_read_duration_of_wav() {
        let blob = wav_blob(8000, 2.5);
        let secs = read_duration_secs(&blob).unwrap().unwrap();
        assert!((secs - 2.5).abs() < 0.01, "got {}", secs);
    }

    #[test]
    fn test_read_duration_rejects_garbage() {
        let blob = MediaBlob::new("audio/mpeg", b"definitely not audio".to_vec());
        assert!(read_duration_secs(&blob).is_err());
    }

    #[test]
    fn test_decoder_reports_duration() {
        let decoder = AudioDecoder::from_blob(&wav_blob(8000, 1.0)).unwrap();
        assert_eq!(decoder.duration_ms(), 1000);
        assert_eq!(decoder.current_position_ms(), 0);
    }

    #[test]
    fn test_decoder_produces_stereo_samples() {
        let mut decoder = AudioDecoder::from_blob(&wav_blob(8000, 1.0)).unwrap();

        let chunk = decoder.decode_next_chunk().unwrap();
        assert!(!chunk.is_end);
        assert!(!chunk.samples.is_empty());
        assert_eq!(chunk.samples.len() % 2, 0, "samples must be interleaved stereo");
        assert_eq!(chunk.sample_rate, 8000);
    }
}
