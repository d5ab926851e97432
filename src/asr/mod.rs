//! ASR (Automatic Speech Recognition) Module
//!
//! The host recognizer is an external capability. This module defines the
//! narrow interface the session manager drives and the events it reports:
//! - [`Recognizer`]: start/stop/abort requests
//! - [`RecognizerEvent`]: start, result, error and end notifications
//! - `stdin`: a line-based backend for the demo binary

pub mod stdin;

use crate::error::VoiceResult;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

pub use stdin::StdinRecognizer;

/// Continuous recognizer controlled by the session manager.
///
/// All calls are requests: a stop is only complete once the recognizer
/// reports [`RecognizerEvent::Ended`]. `start` on a running recognizer
/// should fail with [`crate::error::VoiceError::RecognizerBusy`].
pub trait Recognizer: Send {
    fn start(&mut self) -> VoiceResult<()>;

    fn stop(&mut self) -> VoiceResult<()>;

    /// Stop immediately, discarding pending audio
    fn abort(&mut self) -> VoiceResult<()> {
        self.stop()
    }

    fn name(&self) -> &str;
}

/// Notifications emitted by a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Started,
    Result { transcript: String, is_final: bool },
    Error(RecognizerErrorCode),
    Ended,
}

/// Error codes reported by the host recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerErrorCode {
    NoSpeech,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    Network,
    AudioCapture,
    Other(String),
}

/// How the session manager reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Not an error; no state change
    Ignored,
    /// Self-inflicted stop already being handled
    Aborted,
    /// Permission denial; stop for good
    Fatal,
    /// Transient network trouble; back off before one restart
    Network,
    /// Anything else; retried on end
    Retryable,
}

impl RecognizerErrorCode {
    /// Parse a host error code such as `"not-allowed"`
    pub fn parse(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "no-speech" => RecognizerErrorCode::NoSpeech,
            "aborted" => RecognizerErrorCode::Aborted,
            "not-allowed" => RecognizerErrorCode::NotAllowed,
            "service-not-allowed" => RecognizerErrorCode::ServiceNotAllowed,
            "network" => RecognizerErrorCode::Network,
            "audio-capture" => RecognizerErrorCode::AudioCapture,
            other => RecognizerErrorCode::Other(other.to_string()),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            RecognizerErrorCode::NoSpeech => ErrorClass::Ignored,
            RecognizerErrorCode::Aborted => ErrorClass::Aborted,
            RecognizerErrorCode::NotAllowed | RecognizerErrorCode::ServiceNotAllowed => {
                ErrorClass::Fatal
            }
            RecognizerErrorCode::Network => ErrorClass::Network,
            RecognizerErrorCode::AudioCapture | RecognizerErrorCode::Other(_) => {
                ErrorClass::Retryable
            }
        }
    }
}

impl fmt::Display for RecognizerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerErrorCode::NoSpeech => f.write_str("no-speech"),
            RecognizerErrorCode::Aborted => f.write_str("aborted"),
            RecognizerErrorCode::NotAllowed => f.write_str("not-allowed"),
            RecognizerErrorCode::ServiceNotAllowed => f.write_str("service-not-allowed"),
            RecognizerErrorCode::Network => f.write_str("network"),
            RecognizerErrorCode::AudioCapture => f.write_str("audio-capture"),
            RecognizerErrorCode::Other(code) => f.write_str(code),
        }
    }
}

/// Sending half handed to a recognizer backend
#[derive(Debug, Clone)]
pub struct RecognizerEventSender {
    tx: mpsc::UnboundedSender<RecognizerEvent>,
}

impl RecognizerEventSender {
    pub fn send(&self, event: RecognizerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Recognizer event dropped, session closed");
        }
    }

    pub fn started(&self) {
        self.send(RecognizerEvent::Started);
    }

    pub fn result(&self, transcript: impl Into<String>, is_final: bool) {
        self.send(RecognizerEvent::Result {
            transcript: transcript.into(),
            is_final,
        });
    }

    pub fn error(&self, code: RecognizerErrorCode) {
        self.send(RecognizerEvent::Error(code));
    }

    pub fn ended(&self) {
        self.send(RecognizerEvent::Ended);
    }
}

/// Receiving half consumed by the session manager
pub type RecognizerEvents = mpsc::UnboundedReceiver<RecognizerEvent>;

/// Create the channel connecting a recognizer backend to the session
pub fn event_channel() -> (RecognizerEventSender, RecognizerEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecognizerEventSender { tx }, rx)
}
