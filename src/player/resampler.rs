//! Sample-rate normalizer for devices that reject a track's native rate.
//!
//! The pipeline keeps decoded audio at the track's own rate and shifts
//! playback speed at the sink, so this only runs when the output device
//! cannot be configured at the nominal rate at all (fixed-rate DACs,
//! exclusive-mode shares).

use rubato::{FftFixedIn, Resampler as _};

const CHUNK_FRAMES: usize = 1024;

pub struct Resampler {
    inner: FftFixedIn<f32>,
    channels: usize,
    /// Per-channel staging for partial chunks.
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    /// `input_rate` and `output_rate` must differ; equal rates should bypass
    /// this type entirely.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Option<Self> {
        let channels = usize::from(channels.max(1));
        let inner = FftFixedIn::<f32>::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_FRAMES,
            2,
            channels,
        )
        .map_err(|e| tracing::warn!(input_rate, output_rate, "resampler rejected config: {e}"))
        .ok()?;

        tracing::info!(input_rate, output_rate, channels, "resampling enabled");
        Some(Self {
            inner,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    /// Feed interleaved samples; returns resampled interleaved output.
    /// Incomplete chunks stay buffered until more input (or `flush`) arrives.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        for (i, sample) in input.iter().enumerate() {
            self.pending[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();

            match self.inner.process(&chunk, None) {
                Ok(resampled) => interleave_into(&resampled, &mut output),
                Err(e) => tracing::warn!("resampling error, frame skipped: {e}"),
            }
        }
        output
    }

    /// Discard staged input and internal filter state, for seek
    /// discontinuities.
    pub fn reset(&mut self) {
        for ch in &mut self.pending {
            ch.clear();
        }
        self.inner.reset();
    }

    /// Drain the staging buffers at end of stream by zero-padding the last
    /// chunk.
    pub fn flush(&mut self) -> Vec<f32> {
        let remaining = self.pending[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|ch| {
                ch.resize(CHUNK_FRAMES, 0.0);
                std::mem::take(ch)
            })
            .collect();

        let mut output = Vec::new();
        match self.inner.process(&chunk, None) {
            Ok(resampled) => interleave_into(&resampled, &mut output),
            Err(e) => tracing::warn!("resampler flush error: {e}"),
        }
        output
    }
}

fn interleave_into(planar: &[Vec<f32>], output: &mut Vec<f32>) {
    if planar.is_empty() || planar[0].is_empty() {
        return;
    }
    let frames = planar[0].len();
    output.reserve(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            output.push(channel[frame]);
        }
    }
}
