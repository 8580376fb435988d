//! Error types for Sena

use thiserror::Error;

/// Result type alias for Sena operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Chat-completion backend error
    #[error("backend error: {0}")]
    Backend(String),

    /// Network call exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Persisted history did not match the expected shape
    #[error("malformed persisted state: {0}")]
    MalformedState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Outcome of a failed listen call
///
/// `NoSpeechDetected` and `Timeout` are ordinary capture misses and the main
/// loop simply listens again; `Failed` carries a real backend or device fault.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Speech was captured but nothing intelligible came back
    #[error("no speech understood")]
    NoSpeechDetected,

    /// Nobody spoke before the listen window closed
    #[error("listen timed out")]
    Timeout,

    /// Device or transcription backend failure
    #[error(transparent)]
    Failed(#[from] Error),
}

impl CaptureError {
    /// Whether the caller should silently listen again
    #[must_use]
    pub const fn is_miss(&self) -> bool {
        matches!(self, Self::NoSpeechDetected | Self::Timeout)
    }
}
