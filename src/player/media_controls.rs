//! OS media-controls integration via souvlaki.
//!
//! Platform transports: MPRIS over D-Bus on Linux, SMTC on Windows,
//! MediaCenter on macOS. The bridge runs on its own thread; commands from
//! the OS arrive over a bounded channel and are executed by the control
//! thread, updates flow the other way. Playback keys on keyboards and
//! headsets land here.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, PlatformConfig, SeekDirection,
};

use crate::config::MPRIS_REGISTER_TRIES;

/// Default offset for a bare seek-direction event.
const SEEK_STEP_MS: f64 = 10_000.0;

/// Commands received from the OS media controls.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Previous,
    /// Relative seek in signed milliseconds.
    SeekBy(f64),
    /// Absolute position.
    SetPosition(Duration),
    /// Normalized bus volume in `[0, 1]`.
    SetVolume(f64),
}

/// Updates pushed to the bridge thread.
#[derive(Debug, Clone)]
pub enum ControlsUpdate {
    Metadata {
        title: String,
        album: String,
        artist: String,
        duration: Duration,
    },
    Playback {
        playing: bool,
    },
    Shutdown,
}

/// Handle owned by the player; dropping it shuts the bridge down.
pub struct MediaControlsHandle {
    update_tx: Sender<ControlsUpdate>,
    command_rx: Receiver<ControlCommand>,
}

impl MediaControlsHandle {
    /// Spawn the bridge thread. Returns `None` when the thread cannot start;
    /// bus-registration failures are handled inside the thread (the player
    /// simply never hears from it).
    pub fn spawn(base_name: &str) -> Option<Self> {
        let (update_tx, update_rx) = bounded::<ControlsUpdate>(64);
        let (command_tx, command_rx) = bounded::<ControlCommand>(64);
        let base = sanitize_bus_name(base_name);

        match std::thread::Builder::new()
            .name("media-controls".into())
            .spawn(move || match run_media_controls(&base, update_rx, command_tx) {
                Ok(()) => tracing::debug!("media controls thread ended"),
                Err(e) => tracing::info!("continuing without media controls: {e}"),
            }) {
            Ok(_) => Some(Self {
                update_tx,
                command_rx,
            }),
            Err(e) => {
                tracing::error!("failed to spawn media controls thread: {e}");
                None
            }
        }
    }

    pub fn set_metadata(&self, title: &str, album: &str, artist: &str, duration: Duration) {
        let _ = self.update_tx.try_send(ControlsUpdate::Metadata {
            title: title.to_owned(),
            album: album.to_owned(),
            artist: artist.to_owned(),
            duration,
        });
    }

    pub fn set_playback(&self, playing: bool) {
        let _ = self.update_tx.try_send(ControlsUpdate::Playback { playing });
    }

    pub fn try_recv_command(&self) -> Option<ControlCommand> {
        self.command_rx.try_recv().ok()
    }

    pub fn shutdown(&self) {
        let _ = self.update_tx.try_send(ControlsUpdate::Shutdown);
    }
}

impl Drop for MediaControlsHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_media_controls(
    base: &str,
    update_rx: Receiver<ControlsUpdate>,
    command_tx: Sender<ControlCommand>,
) -> Result<(), String> {
    let hwnd = None;

    // Multiple instances race for the same name; suffix a counter until a
    // registration sticks.
    let mut controls = None;
    for n in 1..=MPRIS_REGISTER_TRIES {
        let name = format!("{base}_{n}");
        match MediaControls::new(PlatformConfig {
            dbus_name: &name,
            display_name: base,
            hwnd,
        }) {
            Ok(c) => {
                tracing::info!(bus = %name, "media controls registered");
                controls = Some(c);
                break;
            }
            Err(e) => tracing::debug!(attempt = n, "bus registration failed: {e:?}"),
        }
    }
    let mut controls = controls.ok_or_else(|| "no free bus name".to_owned())?;

    let tx = command_tx.clone();
    controls
        .attach(move |event: MediaControlEvent| {
            if let Some(cmd) = map_event(event) {
                let _ = tx.try_send(cmd);
            }
        })
        .map_err(|e| format!("failed to attach event handler: {e:?}"))?;

    loop {
        match update_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(ControlsUpdate::Metadata {
                title,
                album,
                artist,
                duration,
            }) => {
                let metadata = MediaMetadata {
                    title: Some(&title),
                    album: Some(&album),
                    artist: Some(&artist),
                    duration: Some(duration),
                    cover_url: None,
                };
                if let Err(e) = controls.set_metadata(metadata) {
                    tracing::warn!("failed to set metadata: {e:?}");
                }
            }
            Ok(ControlsUpdate::Playback { playing }) => {
                let playback = if playing {
                    MediaPlayback::Playing { progress: None }
                } else {
                    MediaPlayback::Paused { progress: None }
                };
                if let Err(e) = controls.set_playback(playback) {
                    tracing::debug!("failed to set playback state: {e:?}");
                }
            }
            Ok(ControlsUpdate::Shutdown) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
        }
    }
    Ok(())
}

fn map_event(event: MediaControlEvent) -> Option<ControlCommand> {
    match event {
        MediaControlEvent::Play => Some(ControlCommand::Play),
        MediaControlEvent::Pause => Some(ControlCommand::Pause),
        MediaControlEvent::Toggle => Some(ControlCommand::Toggle),
        MediaControlEvent::Stop => Some(ControlCommand::Stop),
        MediaControlEvent::Next => Some(ControlCommand::Next),
        MediaControlEvent::Previous => Some(ControlCommand::Previous),
        MediaControlEvent::Seek(dir) => Some(ControlCommand::SeekBy(signed(dir, SEEK_STEP_MS))),
        MediaControlEvent::SeekBy(dir, dur) => {
            Some(ControlCommand::SeekBy(signed(dir, dur.as_millis() as f64)))
        }
        MediaControlEvent::SetPosition(pos) => Some(ControlCommand::SetPosition(pos.0)),
        MediaControlEvent::SetVolume(v) => Some(ControlCommand::SetVolume(v)),
        MediaControlEvent::OpenUri(_) => None,
        MediaControlEvent::Raise | MediaControlEvent::Quit => None,
    }
}

fn signed(dir: SeekDirection, ms: f64) -> f64 {
    match dir {
        SeekDirection::Forward => ms,
        SeekDirection::Backward => -ms,
    }
}

/// Bus name components allow `[A-Za-z0-9_]` and must not start with a digit.
fn sanitize_bus_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, 'p');
    }
    out
}
