//! Speech output arbiter
//!
//! Single-flight spoken output. One task owns the TTS engine and decides
//! what plays: interrupting requests cut in immediately, everything else
//! is debounced and queued behind the current utterance, and nothing plays
//! before the user has interacted.

use crate::error::VoiceError;
use crate::registry::{TranscriptEvent, TranscriptRegistry};
use crate::tts::TtsEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// How a speech request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to the end
    Spoken,
    /// Replaced by a later request before it started
    Superseded,
    /// Cut off while playing
    Interrupted,
    /// Not played: no user interaction yet, or nothing to say
    Suppressed,
    /// The engine failed
    Failed,
}

/// Resolves once the request has been spoken, dropped or cancelled
#[derive(Debug)]
pub struct SpeechTicket {
    rx: oneshot::Receiver<SpeechOutcome>,
}

impl SpeechTicket {
    pub async fn outcome(self) -> SpeechOutcome {
        // A closed arbiter never plays anything
        self.rx.await.unwrap_or(SpeechOutcome::Failed)
    }
}

type Reply = oneshot::Sender<SpeechOutcome>;

enum SpeechMessage {
    Speak {
        text: String,
        interrupt: bool,
        reply: Reply,
    },
    Stop,
    Finished {
        id: u64,
        result: Result<(), VoiceError>,
    },
    Shutdown,
}

/// Handle to the arbiter task
#[derive(Clone)]
pub struct SpeechArbiter {
    tx: mpsc::UnboundedSender<SpeechMessage>,
    interacted: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
}

impl std::fmt::Debug for SpeechArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechArbiter")
            .field("interacted", &self.has_user_interacted())
            .field("speaking", &self.is_speaking())
            .finish()
    }
}

impl SpeechArbiter {
    /// Spawn the arbiter on the current runtime
    pub fn spawn(
        engine: Arc<dyn TtsEngine>,
        transcripts: TranscriptRegistry,
        spacing: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let interacted = Arc::new(AtomicBool::new(false));
        let speaking = Arc::new(AtomicBool::new(false));

        info!("🔊 Speech arbiter using '{}'", engine.name());
        let worker = Worker {
            engine,
            transcripts,
            spacing,
            tx: tx.downgrade(),
            interacted: interacted.clone(),
            speaking: speaking.clone(),
            pending: None,
            current: None,
            next_id: 1,
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            interacted,
            speaking,
        }
    }

    /// Queue `text`. With `interrupt` the current utterance is cut off and
    /// this one starts now; without it, only the last request of a burst
    /// is spoken.
    pub fn speak(&self, text: impl Into<String>, interrupt: bool) -> SpeechTicket {
        let (reply, rx) = oneshot::channel();
        let message = SpeechMessage::Speak {
            text: text.into(),
            interrupt,
            reply,
        };
        if let Err(mpsc::error::SendError(SpeechMessage::Speak { reply, .. })) =
            self.tx.send(message)
        {
            let _ = reply.send(SpeechOutcome::Failed);
        }
        SpeechTicket { rx }
    }

    /// Speak and wait for the outcome
    pub async fn speak_text(&self, text: impl Into<String>, interrupt: bool) -> SpeechOutcome {
        self.speak(text, interrupt).outcome().await
    }

    /// Cancel the current utterance and anything pending
    pub fn stop_speaking(&self) {
        let _ = self.tx.send(SpeechMessage::Stop);
    }

    /// Record the user gesture that unlocks audio playback
    pub fn mark_user_interacted(&self) {
        if !self.interacted.swap(true, Ordering::SeqCst) {
            info!("👆 User interaction recorded, speech enabled");
        }
    }

    pub fn has_user_interacted(&self) -> bool {
        self.interacted.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Stop speaking and end the arbiter task
    pub fn shutdown(&self) {
        let _ = self.tx.send(SpeechMessage::Shutdown);
    }
}

struct Pending {
    text: String,
    reply: Reply,
    due: Instant,
}

struct Current {
    id: u64,
    handle: JoinHandle<()>,
    reply: Reply,
}

struct Worker {
    engine: Arc<dyn TtsEngine>,
    transcripts: TranscriptRegistry,
    spacing: Duration,
    // Weak, so the worker ends once every handle is gone
    tx: mpsc::WeakUnboundedSender<SpeechMessage>,
    interacted: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
    pending: Option<Pending>,
    current: Option<Current>,
    next_id: u64,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SpeechMessage>) {
        loop {
            // Pending speech waits for its debounce deadline and a free channel
            let due = match (&self.pending, &self.current) {
                (Some(pending), None) => Some(pending.due),
                _ => None,
            };

            tokio::select! {
                message = rx.recv() => match message {
                    Some(SpeechMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message),
                },
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    if let Some(pending) = self.pending.take() {
                        self.start(pending.text, pending.reply, false);
                    }
                }
            }
        }

        self.cancel_all();
        debug!("Speech arbiter stopped");
    }

    fn handle(&mut self, message: SpeechMessage) {
        match message {
            SpeechMessage::Speak {
                text,
                interrupt,
                reply,
            } => self.on_speak(text, interrupt, reply),
            SpeechMessage::Stop => {
                if self.cancel_all() {
                    info!("🔇 Speech stopped");
                }
            }
            SpeechMessage::Finished { id, result } => self.on_finished(id, result),
            SpeechMessage::Shutdown => {}
        }
    }

    fn on_speak(&mut self, text: String, interrupt: bool, reply: Reply) {
        let text = text.trim().to_string();
        if text.is_empty() {
            let _ = reply.send(SpeechOutcome::Suppressed);
            return;
        }
        if !self.interacted.load(Ordering::SeqCst) {
            debug!("Speech suppressed until user interaction: '{}'", text);
            let _ = reply.send(SpeechOutcome::Suppressed);
            return;
        }

        if let Some(previous) = self.pending.take() {
            debug!("Superseded pending speech: '{}'", previous.text);
            let _ = previous.reply.send(SpeechOutcome::Superseded);
        }

        if interrupt {
            let cut_off = self.interrupt_current();
            self.start(text, reply, cut_off);
        } else {
            self.pending = Some(Pending {
                text,
                reply,
                due: Instant::now() + self.spacing,
            });
        }
    }

    /// Abort the playing utterance; returns whether there was one
    fn interrupt_current(&mut self) -> bool {
        match self.current.take() {
            Some(current) => {
                current.handle.abort();
                let _ = current.reply.send(SpeechOutcome::Interrupted);
                self.speaking.store(false, Ordering::SeqCst);
                debug!("Interrupted utterance #{}", current.id);
                true
            }
            None => false,
        }
    }

    fn cancel_all(&mut self) -> bool {
        let had_pending = match self.pending.take() {
            Some(pending) => {
                let _ = pending.reply.send(SpeechOutcome::Superseded);
                true
            }
            None => false,
        };
        let had_current = self.interrupt_current();
        if had_current {
            let engine = self.engine.clone();
            tokio::spawn(async move { engine.stop().await });
        }
        had_pending || had_current
    }

    fn start(&mut self, text: String, reply: Reply, stop_first: bool) {
        let id = self.next_id;
        self.next_id += 1;

        debug!("🗣️ Speaking #{}: '{}'", id, text);
        self.speaking.store(true, Ordering::SeqCst);
        self.transcripts.dispatch(&TranscriptEvent::assistant(text.clone()));

        let engine = self.engine.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            if stop_first {
                engine.stop().await;
            }
            let result = engine.speak(&text).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SpeechMessage::Finished { id, result });
            }
        });

        self.current = Some(Current { id, handle, reply });
    }

    fn on_finished(&mut self, id: u64, result: Result<(), VoiceError>) {
        let current = match self.current.take() {
            Some(current) if current.id == id => current,
            other => {
                // Late report from an utterance that was already cut off
                self.current = other;
                return;
            }
        };
        self.speaking.store(false, Ordering::SeqCst);

        let outcome = match result {
            Ok(()) => SpeechOutcome::Spoken,
            Err(e) if e.is_interruption() => SpeechOutcome::Interrupted,
            Err(VoiceError::PlaybackBlocked) => {
                warn!("⚠️ Playback blocked by host policy, waiting for user interaction");
                self.interacted.store(false, Ordering::SeqCst);
                SpeechOutcome::Failed
            }
            Err(e) => {
                error!("❌ Speech synthesis failed: {}", e);
                SpeechOutcome::Failed
            }
        };
        let _ = current.reply.send(outcome);
    }
}
