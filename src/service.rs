//! Voice control service
//!
//! The object the application root constructs once and hands to every
//! collaborator. It owns the session actor, the speech arbiter and both
//! subscriber registries.

use crate::asr::{Recognizer, RecognizerEvents};
use crate::commands::{CommandEvent, CommandInterpreter};
use crate::config::Config;
use crate::core::TranscriptNormalizer;
use crate::dictation::DictationCapture;
use crate::error::{VoiceError, VoiceResult};
use crate::registry::{Callback, Registry, Subscription, TranscriptEvent, TranscriptRegistry};
use crate::session::{self, DictationCallback, SessionMessage, SessionParts, SessionState};
use crate::speech::{SpeechArbiter, SpeechOutcome, SpeechTicket};
use crate::tts::TtsEngine;
use crate::utils::FuzzyMatcher;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

pub type CommandCallback = Callback<CommandEvent>;
pub type TranscriptCallback = Callback<TranscriptEvent>;

/// Hands-free voice control: commands, dictation and spoken output.
///
/// Callbacks run on the session task. They must not block; spawn a task to
/// call the async methods. The synchronous methods are safe to call from
/// inside a callback.
pub struct VoiceControlService {
    tx: mpsc::UnboundedSender<SessionMessage>,
    state: watch::Receiver<SessionState>,
    commands: Registry<CommandEvent>,
    transcripts: TranscriptRegistry,
    speech: SpeechArbiter,
}

impl std::fmt::Debug for VoiceControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceControlService")
            .field("state", &self.state())
            .field("commands", &self.commands)
            .field("transcripts", &self.transcripts)
            .field("speech", &self.speech)
            .finish()
    }
}

impl VoiceControlService {
    /// Build the service and spawn its tasks on the current runtime
    pub fn new(
        config: &Config,
        recognizer: Box<dyn Recognizer>,
        events: RecognizerEvents,
        tts: Arc<dyn TtsEngine>,
    ) -> VoiceResult<Self> {
        config.validate()?;
        let timings = config.timings();

        let commands = Registry::new("command");
        let transcripts = Registry::new("transcript");
        let speech = SpeechArbiter::spawn(tts, transcripts.clone(), timings.speech_spacing);

        let matcher = FuzzyMatcher::new(config.match_threshold);
        let parts = SessionParts {
            timings,
            max_consecutive_errors: config.max_consecutive_errors,
            interpreter: CommandInterpreter::new(matcher.clone()),
            normalizer: TranscriptNormalizer::new(&config.voice_corrections),
            dictation: DictationCapture::new(matcher),
            commands: commands.clone(),
            transcripts: transcripts.clone(),
            speech: speech.clone(),
            restart_confirmation: config.restart_confirmation.clone(),
        };
        let (tx, state) = session::spawn(recognizer, events, parts);

        info!("✅ Voice control service ready ({})", config.language);
        Ok(Self {
            tx,
            state,
            commands,
            transcripts,
            speech,
        })
    }

    async fn request(&self, message: impl FnOnce(oneshot::Sender<bool>) -> SessionMessage) -> bool {
        let (reply, rx) = oneshot::channel();
        if let Err(e) = self.post(message(reply)) {
            debug!("{}", e);
            return false;
        }
        rx.await.unwrap_or(false)
    }

    fn send(&self, message: SessionMessage) {
        if let Err(e) = self.post(message) {
            debug!("{}", e);
        }
    }

    fn post(&self, message: SessionMessage) -> VoiceResult<()> {
        self.tx.send(message).map_err(|_| VoiceError::ServiceClosed)
    }

    /// Listen for commands. Registers `on_command`; leaves dictation when
    /// dictating, otherwise an active session is left alone. Returns
    /// whether the session is active.
    pub async fn start_listening(
        &self,
        on_command: Option<CommandCallback>,
        on_dictation: Option<DictationCallback>,
    ) -> bool {
        if let Some(callback) = on_command {
            self.commands.register(callback);
        }
        self.request(|reply| SessionMessage::StartListening {
            on_dictation,
            reply,
        })
        .await
    }

    /// Switch to dictation; fragments go to `on_dictation`
    pub async fn start_dictation(&self, on_dictation: DictationCallback) -> bool {
        self.request(|reply| SessionMessage::StartDictation {
            on_dictation,
            reply,
        })
        .await
    }

    pub fn stop_dictation(&self) {
        self.send(SessionMessage::StopDictation);
    }

    pub fn stop_listening(&self) {
        self.send(SessionMessage::StopListening);
    }

    /// Reset a stuck recognizer, coming back in the same mode
    pub fn restart_recognition(&self) {
        self.send(SessionMessage::Restart);
    }

    pub fn register_command_callback(&self, callback: CommandCallback) -> Subscription {
        self.commands.register(callback)
    }

    pub fn register_transcription_callback(&self, callback: TranscriptCallback) -> Subscription {
        self.transcripts.register(callback)
    }

    pub fn speak(&self, text: impl Into<String>, interrupt: bool) -> SpeechTicket {
        self.speech.speak(text, interrupt)
    }

    pub async fn speak_text(&self, text: impl Into<String>, interrupt: bool) -> SpeechOutcome {
        self.speech.speak_text(text, interrupt).await
    }

    pub fn stop_speaking(&self) {
        self.speech.stop_speaking();
    }

    pub fn mark_user_interacted(&self) {
        self.speech.mark_user_interacted();
    }

    pub fn is_currently_speaking(&self) -> bool {
        self.speech.is_speaking()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Tear everything down: session, speech and both registries
    pub async fn cleanup(&self) {
        info!("🧹 Cleaning up voice control");
        self.speech.shutdown();

        let (reply, rx) = oneshot::channel();
        match self.post(SessionMessage::Shutdown { reply }) {
            Ok(()) => {
                let _ = rx.await;
            }
            Err(e) => debug!("{}", e),
        }

        self.commands.clear();
        self.transcripts.clear();
    }
}
