//! Command-line argument surface.
//!
//! Input paths are positional; when stdin is a pipe, each line is appended
//! as one more path before extension filtering (see `main`).

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use crate::player::BackendKind;

#[derive(Parser, Debug)]
#[command(
    name = "tapedeck",
    about = "Terminal playlist audio player",
    disable_version_flag = true
)]
pub struct Cli {
    /// Audio files to play (also read from stdin, one per line, when piped)
    #[arg(value_name = "FILE")]
    pub paths: Vec<PathBuf>,

    /// Startup volume
    #[arg(long, value_name = "V")]
    pub volume: Option<f32>,

    /// Disable cover images
    #[arg(long)]
    pub no_image: bool,

    /// Use the sndio audio driver
    #[arg(long)]
    pub sndio: bool,

    /// Use the alsa audio driver
    #[arg(long)]
    pub alsa: bool,

    /// Use the pipewire audio driver
    #[arg(long)]
    pub pipewire: bool,

    /// Use the coreaudio audio driver
    #[arg(long)]
    pub coreaudio: bool,

    /// Log level: -1, 0, 1, 2, 3 = none, errors, warnings, info, debug
    #[arg(
        short = 'l',
        long = "logs",
        value_name = "LEVEL",
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i8).range(-1..=3)
    )]
    pub logs: Option<i8>,

    /// Force colored output for the logger
    #[arg(long = "forceLoggerColors")]
    pub force_logger_colors: bool,

    /// Name suffix for the media-control bus instance
    #[arg(long = "mpris-name", value_name = "NAME")]
    pub mpris_name: Option<String>,

    /// Print version
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

impl Cli {
    /// Which sink backend the flags select; the first match wins.
    pub fn backend(&self) -> BackendKind {
        if self.sndio {
            BackendKind::Sndio
        } else if self.alsa {
            BackendKind::Alsa
        } else if self.pipewire {
            BackendKind::Pipewire
        } else if self.coreaudio {
            BackendKind::CoreAudio
        } else {
            BackendKind::Default
        }
    }

    pub fn log_filter(&self) -> LevelFilter {
        match self.logs.unwrap_or(0) {
            i8::MIN..=-1 => LevelFilter::OFF,
            0 => LevelFilter::ERROR,
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            _ => LevelFilter::DEBUG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tapedeck").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn positional_paths_are_collected() {
        let cli = parse(&["a.flac", "b.mp3"]);
        assert_eq!(cli.paths.len(), 2);
        assert_eq!(cli.backend(), BackendKind::Default);
    }

    #[test]
    fn backend_flags_select_a_sink() {
        assert_eq!(parse(&["--alsa", "x.mp3"]).backend(), BackendKind::Alsa);
        assert_eq!(parse(&["--pipewire", "x.mp3"]).backend(), BackendKind::Pipewire);
        assert_eq!(parse(&["--coreaudio", "x.mp3"]).backend(), BackendKind::CoreAudio);
        assert_eq!(parse(&["--sndio", "x.mp3"]).backend(), BackendKind::Sndio);
    }

    #[test]
    fn log_levels_map_to_filters() {
        assert_eq!(parse(&["-l", "-1"]).log_filter(), LevelFilter::OFF);
        assert_eq!(parse(&["-l", "0"]).log_filter(), LevelFilter::ERROR);
        assert_eq!(parse(&["--logs", "2"]).log_filter(), LevelFilter::INFO);
        assert_eq!(parse(&["-l", "3"]).log_filter(), LevelFilter::DEBUG);
        assert_eq!(parse(&[]).log_filter(), LevelFilter::ERROR);
    }

    #[test]
    fn out_of_range_log_level_is_an_argument_error() {
        assert!(Cli::try_parse_from(["tapedeck", "-l", "7"]).is_err());
    }

    #[test]
    fn volume_and_names_parse() {
        let cli = parse(&["--volume", "0.8", "--mpris-name", "deck", "a.ogg"]);
        assert_eq!(cli.volume, Some(0.8));
        assert_eq!(cli.mpris_name.as_deref(), Some("deck"));
    }

    #[test]
    fn version_flag_uses_short_v() {
        assert!(parse(&["-v"]).version);
        assert!(parse(&["--version"]).version);
    }
}
