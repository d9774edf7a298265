//! Application-wide error types.
//!
//! Library modules carry specific `thiserror` enums; `main` prints the
//! top-level [`Error`] and maps it to the exit code. Playback-path failures
//! (a track that will not open, a corrupt frame) are *not* errors at this
//! level: they feed the playlist's message queue and retry logic instead.

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio sink initialization failed
    #[error("audio init: {0}")]
    AudioInit(String),

    /// The selected audio backend is not available in this build
    #[error("compiled without {0} support")]
    BackendUnavailable(&'static str),

    /// No accepted input files after filtering argv/stdin
    #[error("no accepted input provided")]
    NoTracks,

    /// Terminal setup/teardown failure
    #[error("terminal: {0}")]
    Terminal(String),
}

impl Error {
    pub fn audio_init(message: impl Into<String>) -> Self {
        Self::AudioInit(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unavailable_names_the_backend() {
        let err = Error::BackendUnavailable("pipewire");
        assert_eq!(err.to_string(), "compiled without pipewire support");
    }

    #[test]
    fn audio_init_carries_message() {
        let err = Error::audio_init("no output device");
        assert!(err.to_string().contains("no output device"));
    }
}
