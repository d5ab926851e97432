#![allow(dead_code)]

pub mod mock_recognizer;
pub mod mock_tts;

use airis_voice::asr;
use airis_voice::commands::{Command, CommandEvent};
use airis_voice::config::Config;
use airis_voice::dictation::DictationUpdate;
use airis_voice::registry::Callback;
use airis_voice::VoiceControlService;
use mock_recognizer::MockRecognizer;
use mock_tts::MockTts;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct TestContext {
    pub service: VoiceControlService,
    pub recognizer: MockRecognizer,
    pub tts: Arc<MockTts>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_tts(config, MockTts::new())
    }

    pub fn with_tts(config: Config, tts: MockTts) -> Self {
        let (tx, events) = asr::event_channel();
        let recognizer = MockRecognizer::new(tx);
        let tts = Arc::new(tts);
        let service =
            VoiceControlService::new(&config, Box::new(recognizer.clone()), events, tts.clone())
                .expect("Failed to build service");

        Self {
            service,
            recognizer,
            tts,
        }
    }
}

/// Let the actors drain their queues (time is paused, so this is instant)
pub async fn settle() {
    wait(Duration::from_millis(10)).await;
}

pub async fn wait(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Callback that records every event it sees
pub fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Callback<T>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: Callback<T> = Arc::new(move |event: &T| {
        sink.lock().unwrap().push(event.clone());
    });
    (seen, callback)
}

pub fn commands(seen: &Arc<Mutex<Vec<CommandEvent>>>) -> Vec<Command> {
    seen.lock().unwrap().iter().map(|e| e.command).collect()
}

pub fn dictated(seen: &Arc<Mutex<Vec<DictationUpdate>>>) -> Vec<String> {
    seen.lock().unwrap().iter().map(|u| u.text.clone()).collect()
}
