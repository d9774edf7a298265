//! The audio player core.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Control thread (UI event loop)               │
//! │   key map + media-control commands → Player (this module)   │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │
//!                 ▼                              ▼
//!         Playlist controller            Mixer (sink + decoder)
//!                                               │ condvar
//!                                               ▼
//!                                  decoder worker → RingBuffer
//!                                               │ pop
//!                                               ▼
//!                                  real-time callback → device
//! ```
//!
//! [`Player`] is the command surface: every entry point the UI and the
//! media-control bridge use. Both feed it through the control thread, which
//! serializes commands without any re-entrant locking; nothing here is ever
//! called from the audio callback.

pub mod decoder;
pub mod media_controls;
pub mod mixer;
pub mod playlist;
pub mod resampler;
pub mod ring;
pub mod sink;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

pub use decoder::{MediaDecoder, SymphoniaDecoder};
pub use media_controls::{ControlCommand, MediaControlsHandle};
pub use mixer::{Mixer, SharedDecoder};
pub use playlist::{Advance, Message, MessageKind, Playlist, RepeatMode, Track};
pub use ring::RingBuffer;
pub use sink::{AudioSink, BackendKind, CpalSink, NullSink};
pub use state::{MixerState, PlaybackStatus, TrackInfo, format_ms};

use crate::config::MAX_VOLUME;

pub struct Player {
    mixer: Mixer,
    playlist: Playlist,
    controls: Option<MediaControlsHandle>,
}

impl Player {
    pub fn new(mixer: Mixer, playlist: Playlist, controls: Option<MediaControlsHandle>) -> Self {
        Self {
            mixer,
            playlist,
            controls,
        }
    }

    pub fn state(&self) -> &Arc<MixerState> {
        self.mixer.state()
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn playlist_mut(&mut self) -> &mut Playlist {
        &mut self.playlist
    }

    pub fn cover_art(&self) -> Option<image::DynamicImage> {
        self.mixer.cover_art()
    }

    // --- lifecycle -------------------------------------------------------

    pub fn quit(&mut self) {
        self.state().stop();
    }

    /// The top loop exits when shutdown began or the playlist ran out under
    /// repeat None.
    pub fn should_quit(&self) -> bool {
        !self.state().is_running() || self.playlist.end_reached()
    }

    /// One turn of control-thread housekeeping: execute pending
    /// media-control commands and advance past a finished track. Called at
    /// UI refresh cadence.
    pub fn tick(&mut self) {
        self.handle_control_commands();
        self.next_song_if_prev_ended();
    }

    pub fn shutdown(&mut self) {
        if let Some(controls) = self.controls.take() {
            controls.shutdown();
        }
        self.mixer.destroy();
    }

    // --- cursor ----------------------------------------------------------

    pub fn focus_next(&mut self) {
        self.playlist.focus_next();
    }

    pub fn focus_prev(&mut self) {
        self.playlist.focus_prev();
    }

    pub fn focus_first(&mut self) {
        self.playlist.focus_first();
    }

    pub fn focus_last(&mut self) {
        self.playlist.focus_last();
    }

    pub fn focus_up(&mut self, step: usize) {
        self.playlist.focus_up(step);
    }

    pub fn focus_down(&mut self, step: usize) {
        self.playlist.focus_down(step);
    }

    pub fn focus_selected(&mut self) {
        self.playlist.focus_selected();
    }

    // --- selection -------------------------------------------------------

    pub fn select_focused(&mut self) {
        let Some(track) = self.playlist.focused_track() else {
            tracing::warn!(
                visible = self.playlist.visible_indices().len(),
                "selection out of range"
            );
            return;
        };
        self.select(track);
    }

    pub fn select_next(&mut self) {
        let current = self.playlist.selected();
        if let Some(next) = self.playlist.neighbor(current, true) {
            self.select(next);
        }
    }

    pub fn select_prev(&mut self) {
        let current = self.playlist.selected();
        if let Some(prev) = self.playlist.neighbor(current, false) {
            self.select(prev);
        }
    }

    /// Start playing `track`, walking forward per the repeat policy past
    /// entries that fail to open. When one whole pass fails, quit.
    pub fn select(&mut self, track: usize) {
        let mut idx = track;
        let mut failed = 0usize;

        loop {
            if !self.state().is_running() {
                return;
            }
            let Some(path) = self.playlist.track(idx).map(|t| t.path.clone()) else {
                return;
            };
            if self.mixer.play(&path) {
                break;
            }

            let name = self
                .playlist
                .track(idx)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            tracing::warn!(track = %name, "skipping unplayable track");
            self.playlist
                .push_message(MessageKind::Error, format!("failed to open \"{name}\""));

            failed += 1;
            if failed >= self.playlist.search_indices().len().max(1) {
                tracing::error!("every candidate track failed to open, quitting");
                self.quit();
                return;
            }

            match self.playlist.advance_after(idx) {
                Advance::Play(next) => idx = next,
                Advance::End => {
                    self.playlist.set_end_reached();
                    return;
                }
            }
        }

        self.playlist.set_selected(idx);
        let info = self.mixer.metadata_snapshot();
        self.playlist.update_info(info);
        self.notify_track();
        self.notify_playback();
    }

    /// Consume the end-of-stream flag and advance. The compare-exchange in
    /// the state guarantees a single advancement per event even when the UI
    /// and the media-control path race.
    pub fn next_song_if_prev_ended(&mut self) {
        if !self.state().take_song_ended() {
            return;
        }
        let selected = self.playlist.selected();
        match self.playlist.advance_after(selected) {
            Advance::Play(next) => self.select(next),
            Advance::End => {
                self.mixer.pause(true);
                self.playlist.set_end_reached();
                self.notify_playback();
            }
        }
    }

    // --- transport -------------------------------------------------------

    pub fn toggle_pause(&mut self) {
        self.mixer.toggle_pause();
        self.notify_playback();
    }

    pub fn pause(&mut self, pause: bool) {
        self.mixer.pause(pause);
        self.notify_playback();
    }

    pub fn seek_off(&mut self, delta_ms: f64) {
        self.mixer.seek_off(delta_ms);
    }

    pub fn seek_ms(&mut self, ms: f64) {
        self.mixer.seek_ms(ms);
    }

    /// Seek from a user string: "mm:ss" (or "h:mm:ss", plain seconds), or
    /// "pct%".
    pub fn seek_from_input(&mut self, input: &str) {
        let total = self.state().total_ms();
        match parse_seek_input(input, total) {
            Some(ms) => self.seek_ms(ms),
            None => {
                self.playlist
                    .push_message(MessageKind::Warning, format!("bad seek input: {input:?}"));
            }
        }
    }

    // --- volume / rate / repeat -----------------------------------------

    pub fn volume_up(&mut self, step: f32) {
        self.state().volume_up(step);
    }

    pub fn volume_down(&mut self, step: f32) {
        self.state().volume_down(step);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.state().set_volume(volume);
    }

    pub fn toggle_mute(&mut self) {
        self.state().toggle_mute();
    }

    pub fn change_sample_rate_up(&mut self, delta: u32, save: bool) {
        self.mixer.change_sample_rate_up(delta, save);
    }

    pub fn change_sample_rate_down(&mut self, delta: u32, save: bool) {
        self.mixer.change_sample_rate_down(delta, save);
    }

    pub fn restore_sample_rate(&mut self) {
        self.mixer.restore_sample_rate();
    }

    pub fn cycle_repeat(&mut self, forward: bool) -> RepeatMode {
        self.playlist.cycle_repeat(forward)
    }

    // --- filtering -------------------------------------------------------

    /// Live filter refresh while the user types.
    pub fn substring_search(&mut self, query: &str) {
        self.playlist.filter(query);
    }

    /// Commit the filter (Enter in the search prompt).
    pub fn commit_search(&mut self) {
        self.playlist.commit_filter();
    }

    /// Abandon the filter and restore the full view.
    pub fn cancel_search(&mut self) {
        self.playlist.reset_indices();
    }

    // --- media controls --------------------------------------------------

    fn handle_control_commands(&mut self) {
        // Drain without holding a borrow on self.controls across dispatch.
        loop {
            let Some(cmd) = self.controls.as_ref().and_then(|c| c.try_recv_command()) else {
                break;
            };
            tracing::debug!(?cmd, "media-control command");
            match cmd {
                ControlCommand::Play => self.pause(false),
                ControlCommand::Pause | ControlCommand::Stop => self.pause(true),
                ControlCommand::Toggle => self.toggle_pause(),
                ControlCommand::Next => self.select_next(),
                ControlCommand::Previous => self.select_prev(),
                ControlCommand::SeekBy(ms) => self.seek_off(ms),
                ControlCommand::SetPosition(pos) => self.seek_ms(pos.as_millis() as f64),
                ControlCommand::SetVolume(v) => {
                    // Bus volume is normalized; scale back to the canonical
                    // range.
                    self.set_volume((v * f64::from(MAX_VOLUME)) as f32);
                }
            }
        }
    }

    fn notify_track(&self) {
        let Some(controls) = self.controls.as_ref() else {
            return;
        };
        let info = self.playlist.info();
        controls.set_metadata(
            &info.title,
            &info.album,
            &info.artist,
            Duration::from_millis(self.state().total_ms() as u64),
        );
    }

    fn notify_playback(&self) {
        if let Some(controls) = self.controls.as_ref() {
            controls.set_playback(self.state().status() == PlaybackStatus::Playing);
        }
    }
}

/// Parse a seek target: `"42"` seconds, `"1:30"`, `"1:02:03"`, or `"50%"`
/// of `total_ms`.
pub fn parse_seek_input(input: &str, total_ms: f64) -> Option<f64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(pct) = s.strip_suffix('%') {
        let pct: f64 = pct.trim().parse().ok()?;
        return Some(total_ms * pct / 100.0);
    }

    let mut secs = 0u64;
    for part in s.split(':') {
        if part.is_empty() {
            return None;
        }
        let n: u64 = part.trim().parse().ok()?;
        secs = secs * 60 + n;
    }
    Some(secs as f64 * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RING_CAPACITY;
    use crate::test_utils::{FakeDecoder, fake_decoder_shared};
    use std::path::PathBuf;
    use std::thread;
    use std::time::Instant;

    fn player_with(fake: FakeDecoder, names: &[&str], repeat: RepeatMode) -> Player {
        let state = MixerState::new();
        let ring = Arc::new(RingBuffer::new(RING_CAPACITY));
        let mixer = Mixer::start(
            Arc::clone(&state),
            Arc::clone(&ring),
            fake_decoder_shared(fake),
            Box::new(NullSink::new()),
        )
        .unwrap();
        let tracks = names
            .iter()
            .map(|n| Track::new(PathBuf::from(format!("/music/{n}"))))
            .collect();
        let mut playlist = Playlist::new(tracks);
        playlist.set_repeat(repeat);
        Player::new(mixer, playlist, None)
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
    fn next_on_end_advances_through_the_playlist() {
        // Tiny tracks: the first refill hits end of stream immediately.
        let fake = FakeDecoder::with_totals(8_000, 2, 1_024);
        let mut player = player_with(fake, &["a.flac", "b.mp3"], RepeatMode::Playlist);

        player.select(0);
        assert_eq!(player.playlist().selected(), 0);

        assert!(wait_until(2_000, || player.state().take_song_ended()));
        // take_song_ended consumed the flag; advance manually like tick does.
        match player.playlist_mut().advance_after(0) {
            Advance::Play(next) => player.select(next),
            Advance::End => panic!("repeat Playlist never ends"),
        }
        assert_eq!(player.playlist().selected(), 1);
        player.shutdown();
    }

    #[test]
    fn repeat_none_on_last_track_pauses_and_flags_end() {
        let fake = FakeDecoder::with_totals(8_000, 2, 512);
        let mut player = player_with(fake, &["only.wav"], RepeatMode::None);

        player.select(0);
        let ended = wait_until(2_000, || {
            player.next_song_if_prev_ended();
            player.playlist().end_reached()
        });
        assert!(ended);
        assert!(player.should_quit());
        assert!(player.state().is_paused());
        player.shutdown();
    }

    #[test]
    fn broken_track_is_skipped_with_a_message() {
        let fake = FakeDecoder::with_totals(8_000, 2, 200_000).failing_for("missing");
        let mut player = player_with(fake, &["missing.mp3", "good.ogg"], RepeatMode::Playlist);

        player.select(0);
        assert_eq!(player.playlist().selected(), 1, "must fall through to good.ogg");
        let msg = player.playlist().pop_message().expect("an error message");
        assert_eq!(msg.kind, MessageKind::Error);
        assert!(msg.text.contains("failed to open \"missing.mp3\""));
        player.shutdown();
    }

    #[test]
    fn all_tracks_broken_quits() {
        let fake = FakeDecoder::failing();
        let mut player = player_with(fake, &["x.mp3", "y.mp3"], RepeatMode::Playlist);
        player.select(0);
        assert!(player.should_quit());
        player.shutdown();
    }

    #[test]
    fn metadata_snapshot_lands_in_the_playlist() {
        let fake = FakeDecoder::with_totals(8_000, 2, 200_000);
        let mut player = player_with(fake, &["a.flac"], RepeatMode::None);
        player.select(0);
        assert_eq!(player.playlist().info().title, "Fake Song");
        assert_eq!(player.playlist().info().artist, "The Mocks");
        player.shutdown();
    }

    #[test]
    fn parse_seek_inputs() {
        assert_eq!(parse_seek_input("42", 0.0), Some(42_000.0));
        assert_eq!(parse_seek_input("1:30", 0.0), Some(90_000.0));
        assert_eq!(parse_seek_input("1:02:03", 0.0), Some(3_723_000.0));
        assert_eq!(parse_seek_input("50%", 60_000.0), Some(30_000.0));
        assert_eq!(parse_seek_input(" 25 % ", 80_000.0), Some(20_000.0));
        assert_eq!(parse_seek_input("", 1000.0), None);
        assert_eq!(parse_seek_input("abc", 1000.0), None);
        assert_eq!(parse_seek_input("1::2", 1000.0), None);
    }
}
