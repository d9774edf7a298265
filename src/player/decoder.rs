//! Media decoder interface and the symphonia-backed implementation.
//!
//! The decoder owns format probing, packet decoding and conversion to
//! interleaved f32 at the track's native sample rate. Playback-speed changes
//! happen at the sink, never here; the only resampling this module performs
//! is normalizing to the sink's achieved rate when the device refuses the
//! native one.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder as SymDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::resampler::Resampler;
use super::ring::RingBuffer;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecoderError {
    #[error("failed to open: {0}")]
    Open(String),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("seek failed: {0}")]
    Seek(String),
}

/// Result of one ring-buffer fill call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillOutcome {
    /// Interleaved samples pushed during this call.
    pub samples_written: u64,
    /// Decode position after this call, in interleaved samples at the output
    /// rate.
    pub sample_pos: u64,
    /// The stream produced its last frame.
    pub end_of_stream: bool,
}

/// Pluggable media-decoder backend.
///
/// All calls are serialized by the mixer through a single mutex around the
/// decoder instance; implementations do not need interior locking.
pub trait MediaDecoder: Send {
    fn open(&mut self, path: &Path) -> Result<(), DecoderError>;
    /// Release all per-track resources. Idempotent.
    fn close(&mut self);

    /// Native sample rate of the opened track.
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Interleaved sample count of the whole track at the output rate.
    fn total_samples(&self) -> u64;
    fn current_sample_pos(&self) -> u64;
    fn current_ms(&self) -> f64;
    fn total_ms(&self) -> f64;

    /// Tag lookup for "title", "album", "artist".
    fn metadata(&self, key: &str) -> Option<String>;
    /// Decoded embedded cover art, when the container carries one.
    fn cover_art(&self) -> Option<image::DynamicImage>;

    /// Rate the ring-buffer output should be delivered at. Equal to the
    /// native rate in the common case; differing values engage a resampler.
    fn set_output_rate(&mut self, rate: u32);

    /// Jump to the nearest frame boundary at `ms`. The caller flushes the
    /// ring buffer around this.
    fn seek_ms(&mut self, ms: f64) -> Result<(), DecoderError>;

    /// Decode and push interleaved f32 samples into `ring` until its fill
    /// level reaches `high_water` or the stream ends.
    fn fill_ring(&mut self, ring: &RingBuffer, high_water: usize)
    -> Result<FillOutcome, DecoderError>;
}

#[derive(Debug, Clone, Default)]
struct Tags {
    title: Option<String>,
    album: Option<String>,
    artist: Option<String>,
    cover: Option<Vec<u8>>,
}

impl Tags {
    fn absorb(&mut self, revision: &MetadataRevision) {
        for tag in revision.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => self.title = Some(tag.value.to_string()),
                Some(StandardTagKey::Album) => self.album = Some(tag.value.to_string()),
                Some(StandardTagKey::Artist) => self.artist = Some(tag.value.to_string()),
                _ => {}
            }
        }
        if self.cover.is_none()
            && let Some(visual) = revision.visuals().first()
        {
            self.cover = Some(visual.data.to_vec());
        }
    }
}

struct OpenStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
    output_rate: u32,
    resampler: Option<Resampler>,
    current_sample: u64,
    current_ms: f64,
    tags: Tags,
}

/// Symphonia-backed decoder. One instance is reused across tracks; `open`
/// replaces the stream, `close` drops it.
#[derive(Default)]
pub struct SymphoniaDecoder {
    stream: Option<OpenStream>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaDecoder for SymphoniaDecoder {
    fn open(&mut self, path: &Path) -> Result<(), DecoderError> {
        self.close();

        let file = File::open(path)
            .map_err(|e| DecoderError::Open(format!("{}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| DecoderError::Unsupported(e.to_string()))?;

        let mut tags = Tags::default();
        if let Some(metadata) = probed.metadata.get()
            && let Some(revision) = metadata.current()
        {
            tags.absorb(revision);
        }

        let mut reader = probed.format;
        if let Some(revision) = reader.metadata().current() {
            tags.absorb(revision);
        }

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecoderError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| DecoderError::Unsupported("unknown sample rate".into()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecoderError::Unsupported(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            sample_rate,
            channels,
            frames = ?codec_params.n_frames,
            "opened"
        );

        self.stream = Some(OpenStream {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            time_base: codec_params.time_base,
            n_frames: codec_params.n_frames,
            output_rate: sample_rate,
            resampler: None,
            current_sample: 0,
            current_ms: 0.0,
            tags,
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("decoder closed");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.stream.as_ref().map(|s| s.sample_rate).unwrap_or(0)
    }

    fn channels(&self) -> u16 {
        self.stream.as_ref().map(|s| s.channels).unwrap_or(0)
    }

    fn total_samples(&self) -> u64 {
        let Some(s) = self.stream.as_ref() else {
            return 0;
        };
        let Some(frames) = s.n_frames else { return 0 };
        let scaled = if s.output_rate == s.sample_rate {
            frames as f64
        } else {
            frames as f64 * f64::from(s.output_rate) / f64::from(s.sample_rate)
        };
        (scaled * f64::from(s.channels)) as u64
    }

    fn current_sample_pos(&self) -> u64 {
        self.stream.as_ref().map(|s| s.current_sample).unwrap_or(0)
    }

    fn current_ms(&self) -> f64 {
        self.stream.as_ref().map(|s| s.current_ms).unwrap_or(0.0)
    }

    fn total_ms(&self) -> f64 {
        let Some(s) = self.stream.as_ref() else {
            return 0.0;
        };
        match s.n_frames {
            Some(frames) => frames as f64 / f64::from(s.sample_rate) * 1000.0,
            None => 0.0,
        }
    }

    fn metadata(&self, key: &str) -> Option<String> {
        let tags = &self.stream.as_ref()?.tags;
        match key {
            "title" => tags.title.clone(),
            "album" => tags.album.clone(),
            "artist" => tags.artist.clone(),
            _ => None,
        }
    }

    fn cover_art(&self) -> Option<image::DynamicImage> {
        let bytes = self.stream.as_ref()?.tags.cover.as_deref()?;
        match image::load_from_memory(bytes) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::debug!("embedded cover did not decode: {e}");
                None
            }
        }
    }

    fn set_output_rate(&mut self, rate: u32) {
        let Some(s) = self.stream.as_mut() else {
            return;
        };
        s.output_rate = rate;
        s.resampler = if rate != s.sample_rate {
            Resampler::new(s.sample_rate, rate, s.channels)
        } else {
            None
        };
    }

    fn seek_ms(&mut self, ms: f64) -> Result<(), DecoderError> {
        let Some(s) = self.stream.as_mut() else {
            return Ok(());
        };

        let seeked = s
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(ms / 1000.0),
                    track_id: Some(s.track_id),
                },
            )
            .map_err(|e| DecoderError::Seek(e.to_string()))?;
        s.decoder.reset();
        if let Some(r) = s.resampler.as_mut() {
            r.reset();
        }

        let secs = match s.time_base {
            Some(tb) => {
                let t = tb.calc_time(seeked.actual_ts);
                t.seconds as f64 + t.frac
            }
            None => ms / 1000.0,
        };
        s.current_ms = secs * 1000.0;
        s.current_sample = (secs * f64::from(s.output_rate) * f64::from(s.channels)) as u64;
        Ok(())
    }

    fn fill_ring(
        &mut self,
        ring: &RingBuffer,
        high_water: usize,
    ) -> Result<FillOutcome, DecoderError> {
        let Some(s) = self.stream.as_mut() else {
            return Ok(FillOutcome {
                end_of_stream: true,
                ..Default::default()
            });
        };

        let mut written = 0u64;
        loop {
            let packet = match s.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    if let Some(r) = s.resampler.as_mut() {
                        let tail = r.flush();
                        if !tail.is_empty() {
                            written += tail.len() as u64;
                            ring.push(&tail);
                        }
                    }
                    return Ok(FillOutcome {
                        samples_written: written,
                        sample_pos: s.current_sample,
                        end_of_stream: true,
                    });
                }
                Err(SymphoniaError::ResetRequired) => {
                    s.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecoderError::Decode(e.to_string())),
            };

            if packet.track_id() != s.track_id {
                continue;
            }

            let end_ts = packet.ts() + packet.dur();
            let decoded = match s.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!("skipping corrupt frame: {e}");
                    continue;
                }
                Err(e) => return Err(DecoderError::Decode(e.to_string())),
            };

            let samples = interleave_f32(&decoded);
            let out = match s.resampler.as_mut() {
                Some(r) => r.process(&samples),
                None => samples,
            };

            if let Some(tb) = s.time_base {
                let t = tb.calc_time(end_ts);
                let secs = t.seconds as f64 + t.frac;
                s.current_ms = secs * 1000.0;
                s.current_sample =
                    (secs * f64::from(s.output_rate) * f64::from(s.channels)) as u64;
            } else {
                s.current_sample += out.len() as u64;
                s.current_ms = s.current_sample as f64
                    / f64::from(s.output_rate)
                    / f64::from(s.channels.max(1))
                    * 1000.0;
            }

            if out.is_empty() {
                continue;
            }
            written += out.len() as u64;
            let level = ring.push(&out);

            if level >= high_water {
                return Ok(FillOutcome {
                    samples_written: written,
                    sample_pos: s.current_sample,
                    end_of_stream: false,
                });
            }
        }
    }
}

/// Convert a decoded buffer to interleaved f32 regardless of the codec's
/// native sample format.
fn interleave_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            let planes = buf.planes();
            let plane_slice = planes.planes();
            let mut output = Vec::with_capacity(buf.frames() * plane_slice.len());
            for frame in 0..buf.frames() {
                for plane in plane_slice {
                    output.push(plane[frame]);
                }
            }
            output
        }
        AudioBufferRef::F64(buf) => {
            let planes = buf.planes();
            let mut output = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    output.push(plane[frame] as f32);
                }
            }
            output
        }
        AudioBufferRef::S16(buf) => {
            let planes = buf.planes();
            let mut output = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    output.push(f32::from(plane[frame]) / 32768.0);
                }
            }
            output
        }
        AudioBufferRef::S24(buf) => {
            let planes = buf.planes();
            let mut output = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    output.push(plane[frame].0 as f32 / 8_388_608.0);
                }
            }
            output
        }
        AudioBufferRef::S32(buf) => {
            let planes = buf.planes();
            let mut output = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    output.push(plane[frame] as f32 / 2_147_483_648.0);
                }
            }
            output
        }
        AudioBufferRef::U8(buf) => {
            let planes = buf.planes();
            let mut output = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    output.push((f32::from(plane[frame]) - 128.0) / 128.0);
                }
            }
            output
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn open_nonexistent_file_fails() {
        let mut dec = SymphoniaDecoder::new();
        assert!(dec.open(Path::new("/nonexistent/file.mp3")).is_err());
        // A failed open leaves no stream behind.
        assert_eq!(dec.sample_rate(), 0);
        assert_eq!(dec.channels(), 0);
    }

    #[test]
    fn open_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.flac");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"this is not a flac stream at all").unwrap();
        drop(f);

        let mut dec = SymphoniaDecoder::new();
        assert!(dec.open(&path).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let mut dec = SymphoniaDecoder::new();
        dec.close();
        dec.close();
        assert_eq!(dec.sample_rate(), 0);
        assert_eq!(dec.total_samples(), 0);
    }

    #[test]
    fn unopened_decoder_reports_end_of_stream() {
        let dec_ring = RingBuffer::new(64);
        let mut dec = SymphoniaDecoder::new();
        let out = dec.fill_ring(&dec_ring, 32).unwrap();
        assert!(out.end_of_stream);
        assert_eq!(out.samples_written, 0);
    }
}
