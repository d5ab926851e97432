//! AIris Voice Error Types
//!
//! Centralized error handling for the voice control layer.

use thiserror::Error;

/// Central error type for the voice control layer
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Recognizer error: {0}")]
    Recognizer(String),

    /// The host recognizer was already started (harmless, treated as running)
    #[error("Recognizer already started")]
    RecognizerBusy,

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("TTS engine error: {0}")]
    Tts(String),

    /// Host refused to play audio before a user gesture
    #[error("Audio playback blocked until the user interacts")]
    PlaybackBlocked,

    /// Playback was cancelled on purpose
    #[error("Speech interrupted")]
    Interrupted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Voice service is shut down")]
    ServiceClosed,

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for voice control operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Helper to convert Mutex poison errors
impl<T> From<std::sync::PoisonError<T>> for VoiceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        VoiceError::Lock(err.to_string())
    }
}

impl VoiceError {
    /// Expected outcome of a deliberate cancellation, never user-visible
    pub fn is_interruption(&self) -> bool {
        matches!(self, VoiceError::Interrupted)
    }
}
