//! System TTS engine
//!
//! Shells out to speech-dispatcher (`spd-say`) or `espeak-ng`. The child is
//! killed when the speak future is dropped.

use super::TtsEngine;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug)]
pub struct SystemEngine {
    language: String,
}

impl Default for SystemEngine {
    fn default() -> Self {
        Self::new("en-US")
    }
}

impl SystemEngine {
    pub fn new(language: &str) -> Self {
        // Both tools want the bare language code
        let language = language
            .split(['-', '_'])
            .next()
            .unwrap_or("en")
            .to_lowercase();
        Self { language }
    }

    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<std::process::ExitStatus> {
        Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
    }
}

#[async_trait]
impl TtsEngine for SystemEngine {
    async fn speak(&self, text: &str) -> VoiceResult<()> {
        debug!("System speaking: {}", text);

        // -w blocks until speech-dispatcher has finished the message
        match self
            .run("spd-say", &["-w", "-l", &self.language, "--", text])
            .await
        {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => debug!("spd-say exited with {}", status),
            Err(e) if e.kind() == ErrorKind::NotFound => debug!("spd-say not installed"),
            Err(e) => return Err(e.into()),
        }

        match self.run("espeak-ng", &["-v", &self.language, "--", text]).await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(VoiceError::Tts(format!("espeak-ng exited with {}", status))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VoiceError::Tts(
                "No system TTS command found (tried spd-say, espeak-ng)".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop(&self) {
        // Killing spd-say leaves the daemon talking; cancel its queue too
        if let Err(e) = self.run("spd-say", &["-C"]).await {
            debug!("spd-say cancel failed: {}", e);
        }
    }

    fn name(&self) -> &str {
        "system"
    }
}
