//! Engine that speaks nothing

use super::TtsEngine;
use crate::error::VoiceResult;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SilentEngine;

#[async_trait]
impl TtsEngine for SilentEngine {
    async fn speak(&self, text: &str) -> VoiceResult<()> {
        debug!("(muted) {}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}
