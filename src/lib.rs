//! AIris Voice Library
//!
//! Voice-first control layer for a hands-free assistive application:
//! recognition session management, fuzzy command matching, dictation
//! capture and arbitrated speech output.

pub mod asr;
pub mod commands;
pub mod config;
pub mod core;
pub mod dictation;
pub mod error;
pub mod registry;
pub mod service;
pub mod session;
pub mod speech;
pub mod tts;
pub mod utils;

pub use commands::{AppMode, Command, CommandEvent};
pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use registry::{Speaker, Subscription, TranscriptEvent};
pub use service::VoiceControlService;
pub use session::SessionState;
pub use speech::SpeechOutcome;
