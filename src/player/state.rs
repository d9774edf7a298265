//! Shared mixer state and snapshot types.
//!
//! [`MixerState`] is the lock-free state shared between the control thread,
//! the decoder worker and the real-time audio callback. The callback reads
//! volume/mute without synchronization (one-callback staleness is fine);
//! only the lifecycle flags carry release/acquire semantics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::config::MAX_VOLUME;

/// Lock-free state shared with the audio callback.
///
/// Floats are stored bit-cast in integer atomics so the callback never takes
/// a lock.
#[derive(Debug)]
pub struct MixerState {
    running: AtomicBool,
    paused: AtomicBool,
    decoder_active: AtomicBool,
    song_ended: AtomicBool,
    muted: AtomicBool,
    /// Volume in `[0, MAX_VOLUME]` as f32 bits.
    volume_bits: AtomicU32,
    /// Rate the current track was opened at.
    nominal_rate: AtomicU32,
    /// Rate the sink is currently running at; differs from nominal while a
    /// speed shift is active.
    active_rate: AtomicU32,
    channels: AtomicU32,
    /// Decode position in interleaved samples.
    current_sample: AtomicU64,
    /// Decode position in milliseconds as f64 bits.
    current_ms_bits: AtomicU64,
    /// Interleaved sample count of the current track.
    total_samples: AtomicU64,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            decoder_active: AtomicBool::new(false),
            song_ended: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            nominal_rate: AtomicU32::new(48_000),
            active_rate: AtomicU32::new(48_000),
            channels: AtomicU32::new(2),
            current_sample: AtomicU64::new(0),
            current_ms_bits: AtomicU64::new(0.0f64.to_bits()),
            total_samples: AtomicU64::new(0),
        }
    }
}

impl MixerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Begin shutdown; every loop observes this and exits.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    #[inline]
    pub fn decoder_active(&self) -> bool {
        self.decoder_active.load(Ordering::Acquire)
    }

    pub fn set_decoder_active(&self, active: bool) {
        self.decoder_active.store(active, Ordering::Release);
    }

    pub fn set_song_ended(&self) {
        self.song_ended.store(true, Ordering::Release);
    }

    /// Consume the end-of-stream flag. The compare-exchange guarantees
    /// at-most-one advancement per end-of-stream event.
    pub fn take_song_ended(&self) -> bool {
        self.song_ended
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn toggle_mute(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::Relaxed)
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, MAX_VOLUME);
        self.volume_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn volume_up(&self, step: f32) {
        self.set_volume(self.volume() + step);
    }

    pub fn volume_down(&self, step: f32) {
        self.set_volume(self.volume() - step);
    }

    /// Per-sample gain for the callback: cubic perceptual curve, zero while
    /// muted.
    #[inline]
    pub fn gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            let v = self.volume();
            v * v * v
        }
    }

    #[inline]
    pub fn nominal_rate(&self) -> u32 {
        self.nominal_rate.load(Ordering::Relaxed)
    }

    pub fn set_nominal_rate(&self, rate: u32) {
        self.nominal_rate.store(rate, Ordering::Relaxed);
    }

    #[inline]
    pub fn active_rate(&self) -> u32 {
        self.active_rate.load(Ordering::Relaxed)
    }

    pub fn set_active_rate(&self, rate: u32) {
        self.active_rate.store(rate, Ordering::Relaxed);
    }

    /// active / nominal; 1.0 means normal speed.
    pub fn speed(&self) -> f64 {
        let nominal = self.nominal_rate();
        if nominal == 0 {
            1.0
        } else {
            f64::from(self.active_rate()) / f64::from(nominal)
        }
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels.load(Ordering::Relaxed) as u16
    }

    pub fn set_channels(&self, channels: u16) {
        self.channels.store(u32::from(channels), Ordering::Relaxed);
    }

    #[inline]
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Relaxed)
    }

    pub fn set_current_sample(&self, pos: u64) {
        self.current_sample.store(pos, Ordering::Relaxed);
    }

    #[inline]
    pub fn current_ms(&self) -> f64 {
        f64::from_bits(self.current_ms_bits.load(Ordering::Relaxed))
    }

    pub fn set_current_ms(&self, ms: f64) {
        self.current_ms_bits.store(ms.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    pub fn set_total_samples(&self, total: u64) {
        self.total_samples.store(total, Ordering::Relaxed);
    }

    /// Track duration derived from the sample counters.
    pub fn total_ms(&self) -> f64 {
        let rate = self.nominal_rate();
        let channels = self.channels();
        if rate == 0 || channels == 0 {
            return 0.0;
        }
        self.total_samples() as f64 / f64::from(rate) / f64::from(channels) * 1000.0
    }

    pub fn reset_positions(&self) {
        self.set_current_sample(0);
        self.set_current_ms(0.0);
        self.set_total_samples(0);
    }

    pub fn status(&self) -> PlaybackStatus {
        if !self.decoder_active() {
            PlaybackStatus::Stopped
        } else if self.is_paused() {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Playing
        }
    }
}

/// Current playback status, derived from the mixer flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Metadata snapshot of the current track, refreshed once per `play`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub album: String,
    pub artist: String,
}

/// Format milliseconds as `m:ss` or `h:mm:ss`.
pub fn format_ms(ms: f64) -> String {
    let secs = (ms / 1000.0).max(0.0) as u64;
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_clamped() {
        let state = MixerState::default();
        state.set_volume(9.0);
        assert_eq!(state.volume(), MAX_VOLUME);
        state.set_volume(-1.0);
        assert_eq!(state.volume(), 0.0);
    }

    #[test]
    fn gain_is_cubic_and_mutes() {
        let state = MixerState::default();
        state.set_volume(0.5);
        assert!((state.gain() - 0.125).abs() < 1e-6);
        state.toggle_mute();
        assert_eq!(state.gain(), 0.0);
        state.toggle_mute();
        assert!((state.gain() - 0.125).abs() < 1e-6);
    }

    #[test]
    fn song_ended_fires_exactly_once() {
        let state = MixerState::default();
        assert!(!state.take_song_ended());
        state.set_song_ended();
        assert!(state.take_song_ended());
        assert!(!state.take_song_ended());
    }

    #[test]
    fn speed_tracks_rate_ratio() {
        let state = MixerState::default();
        state.set_nominal_rate(48_000);
        state.set_active_rate(24_000);
        assert!((state.speed() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn total_ms_uses_nominal_rate_and_channels() {
        let state = MixerState::default();
        state.set_nominal_rate(48_000);
        state.set_channels(2);
        state.set_total_samples(960_000); // 10 s of stereo
        assert!((state.total_ms() - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn format_ms_styles() {
        assert_eq!(format_ms(0.0), "0:00");
        assert_eq!(format_ms(65_000.0), "1:05");
        assert_eq!(format_ms(3_661_000.0), "1:01:01");
    }
}
