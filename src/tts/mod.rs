//! TTS (Text-to-Speech) Module
//!
//! Provides a unified interface for the speech output backends.

use crate::config::Config;
use crate::error::VoiceResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod silent;
pub mod system;

/// Trait for TTS engines
#[async_trait]
pub trait TtsEngine: Send + Sync + std::fmt::Debug {
    /// Speak the given text, resolving once playback has finished.
    ///
    /// Dropping the future cancels the utterance.
    async fn speak(&self, text: &str) -> VoiceResult<()>;

    /// Silence any playback the engine started out of process
    async fn stop(&self) {}

    /// Get the engine name
    fn name(&self) -> &str;
}

/// Factory to create the configured TTS engine
pub fn create_engine(config: &Config) -> Arc<dyn TtsEngine> {
    info!("🛠️ Creating TTS engine: {}", config.tts_engine);
    let engine: Arc<dyn TtsEngine> = match config.tts_engine.as_str() {
        "system" => {
            info!("  - Using System TTS (spd-say / espeak-ng)");
            Arc::new(system::SystemEngine::new(&config.language))
        }
        "none" | "silent" => {
            info!("  - Speech output disabled");
            Arc::new(silent::SilentEngine)
        }
        other => {
            warn!("  - Unknown engine '{}', falling back to System", other);
            Arc::new(system::SystemEngine::new(&config.language))
        }
    };
    info!("✅ TTS engine '{}' initialized", engine.name());
    engine
}
