use crate::error::{VoiceError, VoiceResult};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main voice control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Recognition
    pub language: String,
    pub match_threshold: f64,
    pub voice_corrections: HashMap<String, String>,

    // Session timing (milliseconds)
    pub auto_restart_delay_ms: u64,
    pub end_fallback_ms: u64,
    pub mode_switch_delay_ms: u64,
    pub restart_settle_ms: u64,
    pub network_backoff_ms: u64,
    pub max_consecutive_errors: u32,

    // Speech output
    pub tts_engine: String,
    pub speech_spacing_ms: u64,
    pub restart_confirmation: Option<String>,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            match_threshold: 0.7,
            voice_corrections: HashMap::from([
                ("start toss".to_string(), "start task".to_string()),
                ("seen description".to_string(), "scene description".to_string()),
            ]),
            auto_restart_delay_ms: 100,
            end_fallback_ms: 200,
            mode_switch_delay_ms: 300,
            restart_settle_ms: 300,
            network_backoff_ms: 2000,
            max_consecutive_errors: 5,
            tts_engine: "system".to_string(),
            speech_spacing_ms: 300,
            restart_confirmation: Some("Restarting voice recognition".to_string()),
            log_level: "info".to_string(),
        }
    }
}

/// Timer values derived from [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay before restarting after an unexpected end
    pub auto_restart: Duration,
    /// Backstop when the recognizer never reports its end
    pub end_fallback: Duration,
    /// Settle delay when returning from dictation to command mode
    pub mode_switch: Duration,
    /// Settle delay of a forced restart
    pub restart_settle: Duration,
    /// Pause after a network-class recognizer error
    pub network_backoff: Duration,
    /// Minimum spacing between non-interrupting utterances
    pub speech_spacing: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Config::default().timings()
    }
}

impl Config {
    /// Load config from the default location, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                // Graceful degradation: log warning and use defaults
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                let backup_path = path.with_extension("json.corrupt");
                let _ = std::fs::rename(path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the matcher and timers cannot work with
    pub fn validate(&self) -> VoiceResult<()> {
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(VoiceError::Config(format!(
                "match_threshold must be in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.max_consecutive_errors == 0 {
            return Err(VoiceError::Config(
                "max_consecutive_errors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timings(&self) -> Timings {
        Timings {
            auto_restart: Duration::from_millis(self.auto_restart_delay_ms),
            end_fallback: Duration::from_millis(self.end_fallback_ms),
            mode_switch: Duration::from_millis(self.mode_switch_delay_ms),
            restart_settle: Duration::from_millis(self.restart_settle_ms),
            network_backoff: Duration::from_millis(self.network_backoff_ms),
            speech_spacing: Duration::from_millis(self.speech_spacing_ms),
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airis-voice")
        .join("config.json")
}
