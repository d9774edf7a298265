//! tapedeck, a terminal playlist audio player.
//!
//! Startup wires the pipeline bottom-up: shared state and ring buffer, the
//! platform sink, the decoder instance, the mixer (which spawns the decoder
//! worker), the playlist, the media-controls bridge, and finally the TUI
//! loop that drives everything.

pub mod cli;
pub mod config;
pub mod error;
pub mod player;
#[cfg(test)]
pub mod test_utils;
pub mod ui;

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use error::Error;
use player::{
    CpalSink, MediaControlsHandle, MessageKind, Mixer, MixerState, Player, Playlist, RepeatMode,
    RingBuffer, SharedDecoder, SymphoniaDecoder, Track,
};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    if cli.version {
        println!("tapedeck {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    init_logging(&cli);

    // Bare invocation: usage, clean exit.
    if cli.paths.is_empty() && io::stdin().is_terminal() {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        let _ = cmd.print_help();
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = cli.log_filter();
    if level == tracing_subscriber::filter::LevelFilter::OFF {
        return;
    }

    // Logs go to stderr so they never land inside the alternate screen.
    let ansi = cli.force_logger_colors || io::stderr().is_terminal();
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(ansi).with_writer(io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    let tracks = gather_tracks(&cli)?;

    let state = MixerState::new();
    state.set_volume(cli.volume.unwrap_or(config::DEFAULT_VOLUME));

    let ring = Arc::new(RingBuffer::new(config::RING_CAPACITY));
    let sink = CpalSink::new(cli.backend(), Arc::clone(&ring), Arc::clone(&state))?;
    let decoder: SharedDecoder = Arc::new(parking_lot::Mutex::new(SymphoniaDecoder::new()));
    let mixer = Mixer::start(Arc::clone(&state), ring, decoder, Box::new(sink))?;

    let mut playlist = Playlist::new(tracks);
    playlist.set_repeat(RepeatMode::Playlist);

    let bus_name = cli
        .mpris_name
        .as_deref()
        .unwrap_or(config::DEFAULT_MPRIS_NAME);
    let controls = MediaControlsHandle::spawn(bus_name);
    if controls.is_none() {
        playlist.push_message(MessageKind::Notify, "media controls unavailable");
    }

    let mut player = Player::new(mixer, playlist, controls);
    player.select_focused();

    ui::run(player, ui::UiOptions {
        no_image: cli.no_image,
    })
}

/// Combine argv paths with piped stdin lines, keep accepted extensions only.
/// Unrecognized extensions are skipped silently.
fn gather_tracks(cli: &Cli) -> Result<Vec<Track>, Error> {
    let mut paths = cli.paths.clone();
    if !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        paths.extend(
            buf.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(PathBuf::from),
        );
    }

    let tracks: Vec<Track> = paths
        .into_iter()
        .filter(|p| config::accepted_format(p))
        .map(Track::new)
        .collect();

    if tracks.is_empty() {
        return Err(Error::NoTracks);
    }
    Ok(tracks)
}
