//! Mock TTS Engine for Testing
//!
//! Records all spoken text for verification.

use airis_voice::error::{VoiceError, VoiceResult};
use airis_voice::tts::TtsEngine;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock TTS engine that records spoken text
#[derive(Debug)]
pub struct MockTts {
    /// All text that started playing
    pub spoken: Arc<Mutex<Vec<String>>>,
    /// Simulate failure on speak
    pub should_fail: Arc<AtomicBool>,
    /// How long each utterance "plays"
    pub duration: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    pub stop_calls: AtomicUsize,
}

/// Marks an utterance as finished even when its future is dropped
struct Playing<'a>(&'a AtomicUsize);

impl Drop for Playing<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTts {
    pub fn new() -> Self {
        Self::with_duration(Duration::from_millis(200))
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(AtomicBool::new(false)),
            duration,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Get all spoken phrases
    pub fn get_spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Check if a phrase was spoken
    pub fn was_spoken(&self, text: &str) -> bool {
        self.spoken.lock().unwrap().iter().any(|s| s.contains(text))
    }

    /// Highest number of utterances that were ever playing at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Default for MockTts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsEngine for MockTts {
    async fn speak(&self, text: &str) -> VoiceResult<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Tts("Mock TTS failure".to_string()));
        }
        self.spoken.lock().unwrap().push(text.to_string());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _playing = Playing(&self.active);

        tokio::time::sleep(self.duration).await;
        Ok(())
    }

    async fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_tts_records_speech() {
        let mock = MockTts::new();
        mock.speak("hello").await.unwrap();
        mock.speak("world").await.unwrap();

        assert!(mock.was_spoken("hello"));
        assert!(mock.was_spoken("world"));
        assert_eq!(mock.get_spoken().len(), 2);
        assert_eq!(mock.max_concurrent(), 1);
    }
}
