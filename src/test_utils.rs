//! Test fixtures shared across module tests.
//!
//! The centerpiece is [`FakeDecoder`], a scripted [`MediaDecoder`] that
//! emits a monotonically increasing sample ramp. It lets the mixer, worker
//! and player tests drive the whole pipeline without touching codec files or
//! an audio device.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::player::decoder::{DecoderError, FillOutcome, MediaDecoder};
use crate::player::mixer::SharedDecoder;
use crate::player::ring::RingBuffer;

/// Scripted decoder: `total` interleaved samples of a rising ramp, pushed in
/// fixed-size chunks.
pub struct FakeDecoder {
    rate: u32,
    channels: u16,
    total: u64,
    chunk: usize,
    fail_open: bool,
    /// Paths containing this substring fail to open, to script broken
    /// playlist entries.
    fail_substring: Option<String>,
    /// Rates handed out by successive `open` calls, to mimic a playlist of
    /// tracks with different formats.
    rate_sequence: VecDeque<u32>,
    open: bool,
    pos: u64,
}

impl FakeDecoder {
    pub fn with_totals(rate: u32, channels: u16, total_samples: u64) -> Self {
        Self {
            rate,
            channels,
            total: total_samples,
            chunk: 4096,
            fail_open: false,
            fail_substring: None,
            rate_sequence: VecDeque::new(),
            open: false,
            pos: 0,
        }
    }

    /// A fake track lasting `secs` seconds.
    pub fn seconds(rate: u32, channels: u16, secs: f64) -> Self {
        let total = (f64::from(rate) * f64::from(channels) * secs) as u64;
        Self::with_totals(rate, channels, total)
    }

    /// Every `open` fails, as a missing/corrupt file would.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::with_totals(48_000, 2, 0)
        }
    }

    pub fn with_rate_sequence(mut self, rates: &[u32]) -> Self {
        self.rate_sequence = rates.iter().copied().collect();
        self
    }

    /// Fail opens whose path contains `substring`.
    pub fn failing_for(mut self, substring: &str) -> Self {
        self.fail_substring = Some(substring.to_owned());
        self
    }
}

impl MediaDecoder for FakeDecoder {
    fn open(&mut self, path: &Path) -> Result<(), DecoderError> {
        if self.fail_open {
            return Err(DecoderError::Open("scripted open failure".into()));
        }
        if let Some(bad) = &self.fail_substring
            && path.to_string_lossy().contains(bad.as_str())
        {
            return Err(DecoderError::Open(format!("{}: scripted", path.display())));
        }
        if let Some(rate) = self.rate_sequence.pop_front() {
            self.rate = rate;
        }
        self.pos = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn sample_rate(&self) -> u32 {
        if self.open { self.rate } else { 0 }
    }

    fn channels(&self) -> u16 {
        if self.open { self.channels } else { 0 }
    }

    fn total_samples(&self) -> u64 {
        if self.open { self.total } else { 0 }
    }

    fn current_sample_pos(&self) -> u64 {
        self.pos
    }

    fn current_ms(&self) -> f64 {
        if !self.open || self.rate == 0 {
            return 0.0;
        }
        self.pos as f64 / f64::from(self.rate) / f64::from(self.channels) * 1000.0
    }

    fn total_ms(&self) -> f64 {
        if !self.open || self.rate == 0 {
            return 0.0;
        }
        self.total as f64 / f64::from(self.rate) / f64::from(self.channels) * 1000.0
    }

    fn metadata(&self, key: &str) -> Option<String> {
        if !self.open {
            return None;
        }
        match key {
            "title" => Some("Fake Song".into()),
            "album" => Some("Fixtures".into()),
            "artist" => Some("The Mocks".into()),
            _ => None,
        }
    }

    fn cover_art(&self) -> Option<image::DynamicImage> {
        None
    }

    fn set_output_rate(&mut self, _rate: u32) {}

    fn seek_ms(&mut self, ms: f64) -> Result<(), DecoderError> {
        let target = (ms * f64::from(self.rate) * f64::from(self.channels) / 1000.0) as u64;
        self.pos = target.min(self.total);
        Ok(())
    }

    fn fill_ring(
        &mut self,
        ring: &RingBuffer,
        high_water: usize,
    ) -> Result<FillOutcome, DecoderError> {
        if !self.open {
            return Ok(FillOutcome {
                end_of_stream: true,
                ..Default::default()
            });
        }

        let mut written = 0u64;
        loop {
            if self.pos >= self.total {
                return Ok(FillOutcome {
                    samples_written: written,
                    sample_pos: self.pos,
                    end_of_stream: true,
                });
            }

            let n = (self.chunk as u64).min(self.total - self.pos);
            let span: Vec<f32> = (self.pos..self.pos + n).map(|i| i as f32).collect();
            let level = ring.push(&span);
            self.pos += n;
            written += n;

            if level >= high_water {
                return Ok(FillOutcome {
                    samples_written: written,
                    sample_pos: self.pos,
                    end_of_stream: false,
                });
            }
        }
    }
}

pub fn fake_decoder_shared(fake: FakeDecoder) -> SharedDecoder {
    Arc::new(Mutex::new(fake))
}
