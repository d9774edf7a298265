//! The mixer: owns the sink, the ring buffer, the decoder instance and the
//! decoder worker thread, and exposes the playback commands.
//!
//! # Pipeline states
//!
//! Idle (no decoder) → Playing (`play`) ↔ Paused (`pause`) → Draining
//! (decoder hit end of file, ring still has samples) → Ended (ring cleared,
//! `song_ended` raised). The control thread observes `song_ended` and asks
//! the playlist for the next selection; nothing here calls back into the
//! playlist.
//!
//! The worker never touches the sink. On end of stream it disarms the ring
//! so the callback free-runs on silence, and flips the atomics the control
//! thread polls.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::decoder::MediaDecoder;
use super::ring::RingBuffer;
use super::sink::AudioSink;
use super::state::{MixerState, TrackInfo};
use crate::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, RING_HIGH_WATER, RING_REFILL_LEVEL};
use crate::error::Error;

pub type SharedDecoder = Arc<Mutex<dyn MediaDecoder>>;

pub struct Mixer {
    state: Arc<MixerState>,
    ring: Arc<RingBuffer>,
    decoder: SharedDecoder,
    sink: Box<dyn AudioSink>,
    worker: Option<JoinHandle<()>>,
}

impl Mixer {
    /// Spawn the decoder worker and take ownership of the pipeline pieces.
    /// The sink must already be bound to `ring` and `state`.
    pub fn start(
        state: Arc<MixerState>,
        ring: Arc<RingBuffer>,
        decoder: SharedDecoder,
        sink: Box<dyn AudioSink>,
    ) -> Result<Self, Error> {
        let worker = {
            let state = Arc::clone(&state);
            let ring = Arc::clone(&ring);
            let decoder = Arc::clone(&decoder);
            thread::Builder::new()
                .name("decoder-worker".into())
                .spawn(move || worker_loop(&state, &ring, &decoder))
                .map_err(|e| Error::audio_init(format!("failed to spawn decoder worker: {e}")))?
        };

        Ok(Self {
            state,
            ring,
            decoder,
            sink,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> &Arc<MixerState> {
        &self.state
    }

    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    /// Open `path` and begin playback. Returns false when the track cannot
    /// be opened or the sink rejects its format; the caller owns retry.
    ///
    /// A user speed scale (active/nominal ≠ 1) survives across tracks: it is
    /// captured before the old decoder closes and reapplied against the new
    /// track's nominal rate.
    pub fn play(&mut self, path: &Path) -> bool {
        let prev_speed = self.state.speed();
        self.pause(true);

        let nominal;
        {
            let mut dec = self.decoder.lock();
            self.ring.set_armed(false);
            if self.state.decoder_active() {
                self.state.set_decoder_active(false);
                dec.close();
            }
            self.ring.clear();
            self.state.reset_positions();

            if let Err(e) = dec.open(path) {
                tracing::warn!(path = %path.display(), "open failed: {e}");
                return false;
            }

            let native = dec.sample_rate().clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
            let channels = dec.channels().max(1);
            nominal = match self.sink.configure(native, channels) {
                Ok(rate) => rate,
                Err(e) => {
                    tracing::error!("sink rejected track format: {e}");
                    dec.close();
                    return false;
                }
            };
            dec.set_output_rate(nominal);

            self.state.set_channels(channels);
            self.state.set_nominal_rate(nominal);
            self.state.set_active_rate(nominal);
            self.state.set_total_samples(dec.total_samples());
            self.ring.set_armed(true);
            self.state.set_decoder_active(true);
        }

        if (prev_speed - 1.0).abs() > 1e-9 {
            let scaled = (f64::from(nominal) * prev_speed).round() as u32;
            self.change_sample_rate(scaled, false);
        }

        self.pause(false);
        true
    }

    /// Pause or resume the sink. Idempotent; pausing a paused mixer is a
    /// no-op.
    pub fn pause(&mut self, pause: bool) {
        if self.state.is_paused() == pause {
            return;
        }
        self.state.set_paused(pause);
        self.sink.set_active(!pause);
        tracing::info!(paused = pause, "pause toggled");
    }

    pub fn toggle_pause(&mut self) {
        self.pause(!self.state.is_paused());
    }

    /// Absolute seek. A barrier for the ring buffer: everything buffered
    /// before the seek is discarded, no pre-seek sample is delivered after.
    pub fn seek_ms(&mut self, ms: f64) {
        let mut dec = self.decoder.lock();
        if !self.state.decoder_active() {
            return;
        }

        let ms = ms.clamp(0.0, dec.total_ms());
        self.ring.clear();
        if let Err(e) = dec.seek_ms(ms) {
            tracing::warn!("seek failed: {e}");
        }

        self.state.set_current_ms(ms);
        let rate = self.state.nominal_rate();
        let channels = self.state.channels();
        self.state
            .set_current_sample((ms * f64::from(rate) * f64::from(channels) / 1000.0) as u64);
        self.state.set_total_samples(dec.total_samples());
    }

    pub fn seek_off(&mut self, delta_ms: f64) {
        self.seek_ms(self.state.current_ms() + delta_ms);
    }

    /// Reconfigure the sink's rate without touching decoder output. `save`
    /// redefines the nominal rate; otherwise only the active rate moves and
    /// playback speed shifts relative to nominal.
    pub fn change_sample_rate(&mut self, rate: u32, save: bool) {
        let rate = rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        let was_active = !self.state.is_paused();

        self.ring.set_armed(false);
        match self.sink.configure(rate, self.state.channels()) {
            Ok(achieved) => {
                if save {
                    self.state.set_nominal_rate(achieved);
                }
                self.state.set_active_rate(achieved);
            }
            Err(e) => tracing::warn!(rate, "sample-rate change failed: {e}"),
        }
        if self.state.decoder_active() {
            self.ring.set_armed(true);
        }
        if was_active {
            self.sink.set_active(true);
        }
    }

    pub fn change_sample_rate_up(&mut self, delta: u32, save: bool) {
        self.change_sample_rate(self.state.active_rate().saturating_add(delta), save);
    }

    pub fn change_sample_rate_down(&mut self, delta: u32, save: bool) {
        self.change_sample_rate(self.state.active_rate().saturating_sub(delta), save);
    }

    pub fn restore_sample_rate(&mut self) {
        self.change_sample_rate(self.state.nominal_rate(), false);
    }

    /// Query the decoder's tags once, at track start.
    pub fn metadata_snapshot(&self) -> TrackInfo {
        let dec = self.decoder.lock();
        TrackInfo {
            title: dec.metadata("title").unwrap_or_default(),
            album: dec.metadata("album").unwrap_or_default(),
            artist: dec.metadata("artist").unwrap_or_default(),
        }
    }

    pub fn cover_art(&self) -> Option<image::DynamicImage> {
        self.decoder.lock().cover_art()
    }

    /// Tear the pipeline down: stop accepting work, wake and join the
    /// worker, then stop the sink. Safe to call twice.
    pub fn destroy(&mut self) {
        self.state.stop();
        self.ring.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.sink.shutdown();
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn worker_loop(state: &MixerState, ring: &RingBuffer, decoder: &Mutex<dyn MediaDecoder>) {
    tracing::debug!("decoder worker started");
    while state.is_running() {
        ring.wait_for_refill(
            RING_REFILL_LEVEL,
            || state.is_running(),
            || state.decoder_active(),
        );
        if !state.is_running() {
            break;
        }
        refill(state, ring, decoder);
    }
    tracing::debug!("decoder worker exited");
}

fn refill(state: &MixerState, ring: &RingBuffer, decoder: &Mutex<dyn MediaDecoder>) {
    let mut dec = decoder.lock();
    if !state.decoder_active() {
        return;
    }

    let finished = match dec.fill_ring(ring, RING_HIGH_WATER) {
        Ok(outcome) => {
            state.set_current_sample(outcome.sample_pos);
            state.set_current_ms(dec.current_ms());
            outcome.end_of_stream
        }
        Err(e) => {
            tracing::warn!("decoder failed mid-track: {e}");
            true
        }
    };

    if finished {
        ring.set_armed(false);
        dec.close();
        ring.clear();
        state.set_decoder_active(false);
        state.set_song_ended();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RING_CAPACITY;
    use crate::player::sink::NullSink;
    use crate::test_utils::{FakeDecoder, fake_decoder_shared};
    use std::time::{Duration, Instant};

    fn mixer_with(fake: FakeDecoder) -> (Mixer, Arc<MixerState>, Arc<RingBuffer>) {
        let state = MixerState::new();
        let ring = Arc::new(RingBuffer::new(RING_CAPACITY));
        let decoder = fake_decoder_shared(fake);
        let mixer = Mixer::start(
            Arc::clone(&state),
            Arc::clone(&ring),
            decoder,
            Box::new(NullSink::new()),
        )
        .unwrap();
        (mixer, state, ring)
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn play_configures_rates_and_unpauses() {
        let (mut mixer, state, _ring) = mixer_with(FakeDecoder::seconds(48_000, 2, 1.0));
        assert!(mixer.play(Path::new("a.flac")));
        assert_eq!(state.nominal_rate(), 48_000);
        assert_eq!(state.active_rate(), 48_000);
        assert_eq!(state.channels(), 2);
        assert!(state.decoder_active());
        assert!(!state.is_paused());
        assert_eq!(state.total_samples(), 96_000);
        mixer.destroy();
    }

    #[test]
    fn failed_open_returns_false_and_stays_idle() {
        let (mut mixer, state, _ring) = mixer_with(FakeDecoder::failing());
        assert!(!mixer.play(Path::new("missing.mp3")));
        assert!(!state.decoder_active());
        mixer.destroy();
    }

    #[test]
    fn speed_scale_survives_track_change() {
        // First open reports 48 kHz, the second 44.1 kHz.
        let fake = FakeDecoder::seconds(48_000, 2, 1.0).with_rate_sequence(&[48_000, 44_100]);
        let (mut mixer, state, _ring) = mixer_with(fake);

        assert!(mixer.play(Path::new("a.flac")));
        mixer.change_sample_rate(24_000, false);
        assert_eq!(state.active_rate(), 24_000);
        assert_eq!(state.nominal_rate(), 48_000);

        // 0.5× speed must carry over: 0.5 × 44100 = 22050.
        assert!(mixer.play(Path::new("b.mp3")));
        assert_eq!(state.nominal_rate(), 44_100);
        assert_eq!(state.active_rate(), 22_050);
        mixer.destroy();
    }

    #[test]
    fn restore_sample_rate_returns_to_nominal_exactly() {
        let (mut mixer, state, _ring) = mixer_with(FakeDecoder::seconds(48_000, 2, 1.0));
        mixer.play(Path::new("a.flac"));
        mixer.change_sample_rate_down(24_000, false);
        assert_eq!(state.active_rate(), 24_000);
        mixer.restore_sample_rate();
        assert_eq!(state.active_rate(), 48_000);
        assert_eq!(state.nominal_rate(), 48_000);
        mixer.destroy();
    }

    #[test]
    fn seek_clamps_to_track_bounds() {
        let (mut mixer, state, _ring) = mixer_with(FakeDecoder::seconds(48_000, 2, 60.0));
        mixer.play(Path::new("a.flac"));
        mixer.seek_ms(f64::NEG_INFINITY);
        assert_eq!(state.current_ms(), 0.0);
        mixer.seek_ms(30_000.0);
        assert!((state.current_ms() - 30_000.0).abs() < 1.0);
        assert_eq!(state.current_sample(), 30 * 48_000 * 2);
        // Clamping to the end positions the decoder at end of stream, so
        // this stays last.
        mixer.seek_ms(f64::INFINITY);
        assert!((state.current_ms() - 60_000.0).abs() < 1.0);
        mixer.destroy();
    }

    #[test]
    fn pause_is_idempotent() {
        let (mut mixer, state, _ring) = mixer_with(FakeDecoder::seconds(48_000, 2, 1.0));
        mixer.play(Path::new("a.flac"));
        mixer.pause(true);
        mixer.pause(true);
        assert!(state.is_paused());
        mixer.pause(false);
        assert!(!state.is_paused());
        mixer.destroy();
    }

    #[test]
    fn draining_the_ring_raises_song_ended_once() {
        // More than the ring can hold, so the worker streams in several
        // refills before hitting end of file.
        let total = 200_000u64;
        let (mut mixer, state, ring) = mixer_with(FakeDecoder::with_totals(8_000, 2, total));
        assert!(mixer.play(Path::new("a.wav")));

        // Consume like a callback would until the worker closes the stream.
        let mut received: Vec<f32> = Vec::new();
        let mut scratch = vec![0.0f32; 512];
        let ended = wait_until(5_000, || {
            if state.decoder_active() {
                let n = ring.pop(&mut scratch);
                received.extend_from_slice(&scratch[..n]);
            }
            !state.decoder_active()
        });
        assert!(ended, "stream never ended");

        // The fake decoder emits a monotonically increasing ramp, so FIFO
        // order shows up as monotone output.
        for pair in received.windows(2) {
            assert!(pair[1] >= pair[0], "samples reordered");
        }
        // End-of-file clears whatever was still buffered, never more than
        // one ring's worth.
        assert!(received.len() as u64 >= total - ring.capacity() as u64);

        assert!(wait_until(500, || state.take_song_ended()));
        assert!(!state.take_song_ended(), "song_ended must fire once");
        mixer.destroy();
    }

    #[test]
    fn destroy_joins_worker_quickly() {
        let (mut mixer, _state, _ring) = mixer_with(FakeDecoder::seconds(48_000, 2, 10.0));
        mixer.play(Path::new("a.flac"));
        let start = Instant::now();
        mixer.destroy();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
