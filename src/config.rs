//! Compile-time defaults and tuning constants.
//!
//! There is deliberately no config file; everything a user may want to vary
//! at runtime is a CLI flag or a key binding.

use std::path::Path;
use std::time::Duration;

/// Upper bound for the volume scale. Values above 1.0 are allowed but may
/// distort.
pub const MAX_VOLUME: f32 = 1.5;

/// Startup volume unless `--volume` is given.
pub const DEFAULT_VOLUME: f32 = 0.4;

/// Clamp range for the sink sample rate (speed shifting can push it around).
pub const MIN_SAMPLE_RATE: u32 = 1_000;
pub const MAX_SAMPLE_RATE: u32 = 9_999_999;

/// Ring buffer capacity in interleaved f32 samples. Must be a power of two;
/// ~340 ms at 48 kHz stereo.
pub const RING_CAPACITY: usize = 1 << 16;

/// The decoder worker refills once the ring drops below [`RING_REFILL_LEVEL`]
/// and stops once it reaches [`RING_HIGH_WATER`].
pub const RING_HIGH_WATER: usize = RING_CAPACITY / 4 * 3;
pub const RING_REFILL_LEVEL: usize = RING_CAPACITY / 2;

/// Largest single pop the audio callback will request (scratch buffer size).
pub const SCRATCH_SAMPLES: usize = 1 << 15;

/// Cadence of the top loop: input poll, end-of-stream check, redraw.
pub const UPDATE_RATE: Duration = Duration::from_millis(100);

/// How long a user-visible message stays on screen, and the dedup window for
/// identical messages.
pub const MESSAGE_DURATION: Duration = Duration::from_secs(5);

/// Bounded capacity of the message queue; overflow drops the oldest entry.
pub const MESSAGE_QUEUE_CAP: usize = 16;

/// Base name for the media-controls bus registration (`--mpris-name`
/// overrides). Registration appends `_<n>` until it succeeds.
pub const DEFAULT_MPRIS_NAME: &str = "tapedeck";
pub const MPRIS_REGISTER_TRIES: u32 = 50;

/// Cover placeholder sizing in terminal rows.
pub const IMAGE_HEIGHT: u16 = 11;
pub const MIN_IMAGE_HEIGHT: u16 = 10;
pub const MAX_IMAGE_HEIGHT: u16 = 30;

/// Page step for Ctrl-D/Ctrl-U/PgDn/PgUp cursor motion.
pub const FOCUS_PAGE_STEP: usize = 22;

/// File extensions accepted from argv/stdin; everything else is skipped
/// silently.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "mp2", "mp3", "mp4", "m4a", "m4b", "fla", "flac", "ogg", "opus", "umx", "s3m", "wav", "caf",
    "aif", "webm", "mkv",
];

/// Whether a path carries one of the accepted audio extensions.
pub fn accepted_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ACCEPTED_EXTENSIONS.iter().any(|a| *a == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_capacity_is_power_of_two() {
        assert!(RING_CAPACITY.is_power_of_two());
        assert!(RING_HIGH_WATER < RING_CAPACITY);
        assert!(RING_REFILL_LEVEL < RING_HIGH_WATER);
    }

    #[test]
    fn accepted_format_matches_extensions() {
        assert!(accepted_format(Path::new("/music/a.flac")));
        assert!(accepted_format(Path::new("b.MP3")));
        assert!(accepted_format(Path::new("dir.with.dots/c.ogg")));
        assert!(!accepted_format(Path::new("cover.png")));
        assert!(!accepted_format(Path::new("noext")));
    }
}
