//! Recognition session manager
//!
//! One actor task owns the recognizer. Facade calls, recognizer events and
//! timers all arrive as messages, so state changes happen in one place and
//! in order. The mode flag is always switched before a stop is requested,
//! which lets the following `Ended` event pick the right continuation.

use crate::asr::{ErrorClass, Recognizer, RecognizerErrorCode, RecognizerEvent, RecognizerEvents};
use crate::commands::{Command, CommandEvent, CommandInterpreter};
use crate::config::Timings;
use crate::core::TranscriptNormalizer;
use crate::dictation::{DictationCapture, DictationOutcome, DictationUpdate};
use crate::error::VoiceError;
use crate::registry::{Callback, CommandRegistry, TranscriptEvent, TranscriptRegistry};
use crate::speech::SpeechArbiter;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, error, info, warn};

/// Consumer of dictation progress
pub type DictationCallback = Callback<DictationUpdate>;

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    ListeningCommand,
    ListeningDictation,
    Restarting,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Command,
    Dictation,
}

/// What to do once the recognizer has reported its end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AfterEnd {
    #[default]
    Nothing,
    StartNow,
    ResumeAfter(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerAction {
    /// The recognizer never confirmed a stop
    EndFallback,
    /// Start again after a settle, restart or backoff delay
    Resume,
}

pub(crate) enum SessionMessage {
    StartListening {
        on_dictation: Option<DictationCallback>,
        reply: oneshot::Sender<bool>,
    },
    StartDictation {
        on_dictation: DictationCallback,
        reply: oneshot::Sender<bool>,
    },
    StopDictation,
    StopListening,
    Restart,
    Timer {
        generation: u64,
        action: TimerAction,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Everything the actor needs besides the recognizer
pub(crate) struct SessionParts {
    pub timings: Timings,
    pub max_consecutive_errors: u32,
    pub interpreter: CommandInterpreter,
    pub normalizer: TranscriptNormalizer,
    pub dictation: DictationCapture,
    pub commands: CommandRegistry,
    pub transcripts: TranscriptRegistry,
    pub speech: SpeechArbiter,
    pub restart_confirmation: Option<String>,
}

fn retry_strategy(cap: Duration) -> ExponentialBackoff {
    // 100ms, 200ms, 400ms ... capped at the network backoff
    ExponentialBackoff::from_millis(2)
        .factor(50)
        .max_delay(cap)
}

/// Spawn the session actor on the current runtime
pub(crate) fn spawn(
    recognizer: Box<dyn Recognizer>,
    events: RecognizerEvents,
    parts: SessionParts,
) -> (
    mpsc::UnboundedSender<SessionMessage>,
    watch::Receiver<SessionState>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);

    info!("🎙️ Session manager using recognizer '{}'", recognizer.name());
    let session = Session {
        recognizer,
        retry: retry_strategy(parts.timings.network_backoff),
        parts,
        tx: tx.downgrade(),
        state_tx,
        mode: Mode::Command,
        listening: false,
        restarting: false,
        recognizer_live: false,
        stopping: false,
        after_end: AfterEnd::Nothing,
        on_dictation: None,
        generation: 0,
        consecutive_errors: 0,
        next_retry: None,
        backoff_until: None,
        last_start_attempt: None,
    };
    tokio::spawn(session.run(rx, events));

    (tx, state_rx)
}

struct Session {
    recognizer: Box<dyn Recognizer>,
    parts: SessionParts,
    tx: mpsc::WeakUnboundedSender<SessionMessage>,
    state_tx: watch::Sender<SessionState>,

    mode: Mode,
    /// Caller wants the recognizer live
    listening: bool,
    restarting: bool,
    /// Started and not yet ended
    recognizer_live: bool,
    /// Stop requested, waiting for `Ended`
    stopping: bool,
    after_end: AfterEnd,
    on_dictation: Option<DictationCallback>,

    /// Timers carrying an older generation are stale
    generation: u64,
    consecutive_errors: u32,
    retry: ExponentialBackoff,
    next_retry: Option<Duration>,
    backoff_until: Option<Instant>,
    last_start_attempt: Option<Instant>,
}

impl Session {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<SessionMessage>,
        mut events: RecognizerEvents,
    ) {
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                message = rx.recv() => match message {
                    Some(SessionMessage::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(message) => self.handle(message),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        warn!("⚠️ Recognizer event stream closed");
                        events_open = false;
                    }
                },
            }
            self.publish();
        }

        debug!("Session manager stopped");
    }

    fn state(&self) -> SessionState {
        if !self.listening {
            SessionState::Idle
        } else if self.restarting {
            SessionState::Restarting
        } else {
            match self.mode {
                Mode::Command => SessionState::ListeningCommand,
                Mode::Dictation => SessionState::ListeningDictation,
            }
        }
    }

    fn publish(&self) {
        let state = self.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Session state: {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::StartListening {
                on_dictation,
                reply,
            } => {
                let listening = self.start_listening(on_dictation);
                let _ = reply.send(listening);
            }
            SessionMessage::StartDictation {
                on_dictation,
                reply,
            } => {
                let listening = self.start_dictation(on_dictation);
                let _ = reply.send(listening);
            }
            SessionMessage::StopDictation => self.stop_dictation(),
            SessionMessage::StopListening => self.stop_listening(),
            SessionMessage::Restart => self.restart(),
            SessionMessage::Timer { generation, action } => {
                if generation == self.generation {
                    self.on_timer(action);
                } else {
                    debug!("Stale {:?} timer ignored", action);
                }
            }
            SessionMessage::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    // ---- transitions requested by collaborators ----

    fn start_listening(&mut self, on_dictation: Option<DictationCallback>) -> bool {
        if let Some(callback) = on_dictation {
            self.on_dictation = Some(callback);
        }
        if self.listening && self.mode == Mode::Dictation {
            info!("🎤 Leaving dictation for command listening");
            self.reset_errors();
            self.enter_command_mode(true);
            return true;
        }
        if self.listening {
            // Restart churn drops utterances; registering is enough
            debug!("Already listening, start ignored");
            return true;
        }

        info!("🎤 Starting command listening");
        self.new_plan();
        self.listening = true;
        self.mode = Mode::Command;
        self.reset_errors();
        self.halt(false, AfterEnd::StartNow);
        self.listening
    }

    fn start_dictation(&mut self, on_dictation: DictationCallback) -> bool {
        self.on_dictation = Some(on_dictation);
        if self.listening && self.mode == Mode::Dictation && !self.restarting {
            debug!("Already dictating, start ignored");
            return true;
        }

        info!("📝 Entering dictation mode");
        self.new_plan();
        // Flip the mode first so the coming end event restarts into dictation
        self.mode = Mode::Dictation;
        self.listening = true;
        self.restarting = false;
        self.parts.dictation.reset();
        self.halt(false, AfterEnd::StartNow);
        self.listening
    }

    fn stop_dictation(&mut self) {
        if self.mode != Mode::Dictation {
            debug!("Not dictating, stop ignored");
            return;
        }
        info!("📝 Leaving dictation mode");
        self.leave_dictation();
    }

    /// Return to command mode, resuming only if someone wants commands
    fn leave_dictation(&mut self) {
        let resume = self.listening && !self.parts.commands.is_empty();
        self.enter_command_mode(resume);
    }

    /// Drop dictation and, when `resume` is set, restart in command mode
    /// after the mode switch delay
    fn enter_command_mode(&mut self, resume: bool) {
        self.new_plan();
        self.mode = Mode::Command;
        self.restarting = false;
        self.parts.dictation.reset();

        if resume {
            self.halt(false, AfterEnd::ResumeAfter(self.parts.timings.mode_switch));
        } else {
            self.listening = false;
            self.halt(false, AfterEnd::Nothing);
        }
    }

    fn stop_listening(&mut self) {
        info!("🛑 Stopping recognition");
        self.new_plan();
        self.listening = false;
        self.restarting = false;
        self.mode = Mode::Command;
        self.parts.dictation.reset();
        self.halt(false, AfterEnd::Nothing);
    }

    fn restart(&mut self) {
        if !self.listening {
            debug!("Not listening, restart ignored");
            return;
        }

        info!("🔄 Restarting recognition ({:?} mode)", self.mode);
        self.new_plan();
        self.restarting = true;
        self.reset_errors();
        self.backoff_until = None;

        if let Some(text) = &self.parts.restart_confirmation {
            let _ticket = self.parts.speech.speak(text.clone(), true);
        }
        self.halt(true, AfterEnd::ResumeAfter(self.parts.timings.restart_settle));
    }

    fn shutdown(&mut self) {
        info!("🧹 Session shutting down");
        self.new_plan();
        self.listening = false;
        self.restarting = false;
        self.stopping = false;
        self.after_end = AfterEnd::Nothing;
        self.on_dictation = None;
        self.parts.dictation.reset();
        if self.recognizer_live {
            if let Err(e) = self.recognizer.abort() {
                debug!("Abort on shutdown failed: {}", e);
            }
            self.recognizer_live = false;
        }
        self.publish();
    }

    // ---- recognizer plumbing ----

    /// Invalidate every outstanding timer
    fn new_plan(&mut self) {
        self.generation += 1;
        self.after_end = AfterEnd::Nothing;
    }

    /// Stop the recognizer if it is live, continuing with `after` once it
    /// has ended; runs `after` straight away when it is already stopped.
    fn halt(&mut self, abort: bool, after: AfterEnd) {
        if !self.recognizer_live {
            self.stopping = false;
            self.run_after(after);
            return;
        }

        self.after_end = after;
        if !self.stopping {
            self.stopping = true;
            if let Err(e) = self.recognizer.stop() {
                debug!("Recognizer stop failed: {}", e);
            }
        }
        if abort {
            if let Err(e) = self.recognizer.abort() {
                debug!("Recognizer abort failed: {}", e);
            }
        }
        self.schedule(self.parts.timings.end_fallback, TimerAction::EndFallback);
    }

    fn run_after(&mut self, after: AfterEnd) {
        match after {
            AfterEnd::Nothing => {}
            AfterEnd::StartNow => self.start_recognizer(),
            AfterEnd::ResumeAfter(delay) => self.schedule(delay, TimerAction::Resume),
        }
    }

    fn start_recognizer(&mut self) {
        if !self.listening || self.recognizer_live {
            return;
        }

        if let Some(until) = self.backoff_until {
            let now = Instant::now();
            if until > now {
                debug!("Backing off for {:?}", until - now);
                self.schedule(until - now, TimerAction::Resume);
                return;
            }
            self.backoff_until = None;
        }

        if let Some(previous) = self.last_start_attempt {
            debug!("Starting recognizer ({:?} since last attempt)", previous.elapsed());
        }
        self.last_start_attempt = Some(Instant::now());

        match self.recognizer.start() {
            Ok(()) => {
                info!("✅ Recognizer started ({:?} mode)", self.mode);
                self.recognizer_live = true;
            }
            Err(VoiceError::RecognizerBusy) => {
                debug!("Recognizer already running");
                self.recognizer_live = true;
            }
            Err(VoiceError::PermissionDenied) => {
                error!("❌ Microphone permission denied, recognition disabled");
                self.go_idle();
            }
            Err(e) => {
                warn!("⚠️ Recognizer failed to start: {}", e);
                if self.count_error() {
                    let delay = self.next_retry_delay();
                    self.schedule(delay, TimerAction::Resume);
                }
            }
        }
    }

    fn schedule(&self, delay: Duration, action: TimerAction) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionMessage::Timer { generation, action });
        });
    }

    fn on_timer(&mut self, action: TimerAction) {
        match action {
            TimerAction::EndFallback => {
                if !self.stopping {
                    return;
                }
                warn!("⚠️ Recognizer end not reported, forcing stop");
                if let Err(e) = self.recognizer.abort() {
                    debug!("Recognizer abort failed: {}", e);
                }
                self.recognizer_live = false;
                self.stopping = false;
                let after = std::mem::take(&mut self.after_end);
                self.generation += 1;
                self.run_after(after);
            }
            TimerAction::Resume => {
                if self.restarting {
                    info!("🔄 Restart settled");
                    self.restarting = false;
                }
                self.start_recognizer();
            }
        }
    }

    fn go_idle(&mut self) {
        self.new_plan();
        self.listening = false;
        self.restarting = false;
        self.mode = Mode::Command;
        self.parts.dictation.reset();
        self.halt(false, AfterEnd::Nothing);
    }

    // ---- recognizer events ----

    fn on_event(&mut self, event: RecognizerEvent) {
        match event {
            RecognizerEvent::Started => {
                debug!("Recognizer reported start");
                self.recognizer_live = true;
            }
            RecognizerEvent::Result {
                transcript,
                is_final,
            } => self.on_result(&transcript, is_final),
            RecognizerEvent::Error(code) => self.on_error(code),
            RecognizerEvent::Ended => self.on_ended(),
        }
    }

    fn on_ended(&mut self) {
        if !self.recognizer_live {
            debug!("Late end event ignored");
            return;
        }
        self.recognizer_live = false;

        if self.stopping {
            debug!("Recognizer stopped");
            self.stopping = false;
            let after = std::mem::take(&mut self.after_end);
            // The end fallback is no longer needed
            self.generation += 1;
            self.run_after(after);
            return;
        }

        if !self.listening || self.restarting {
            return;
        }

        let delay = if let Some(until) = self.backoff_until {
            until.saturating_duration_since(Instant::now())
        } else if let Some(delay) = self.next_retry.take() {
            delay
        } else {
            self.parts.timings.auto_restart
        };
        info!("🔁 Recognition ended unexpectedly, restarting in {:?}", delay);
        self.schedule(delay, TimerAction::Resume);
    }

    fn on_error(&mut self, code: RecognizerErrorCode) {
        match code.class() {
            ErrorClass::Ignored => debug!("No speech detected"),
            ErrorClass::Aborted => debug!("Recognition aborted"),
            ErrorClass::Fatal => {
                error!("❌ Recognition not allowed ({}), stopping", code);
                self.go_idle();
            }
            ErrorClass::Network => {
                warn!(
                    "⚠️ Network error, backing off for {:?}",
                    self.parts.timings.network_backoff
                );
                if self.count_error() {
                    self.backoff_until = Some(Instant::now() + self.parts.timings.network_backoff);
                }
            }
            ErrorClass::Retryable => {
                warn!("⚠️ Recognizer error: {}", code);
                if self.count_error() {
                    self.next_retry = Some(self.next_retry_delay());
                }
            }
        }
    }

    /// Count a failure; returns false once retries are exhausted
    fn count_error(&mut self) -> bool {
        self.consecutive_errors += 1;
        if self.consecutive_errors >= self.parts.max_consecutive_errors {
            error!(
                "❌ {} consecutive recognizer errors, giving up",
                self.consecutive_errors
            );
            self.go_idle();
            return false;
        }
        true
    }

    fn next_retry_delay(&mut self) -> Duration {
        self.retry
            .next()
            .unwrap_or(self.parts.timings.network_backoff)
    }

    fn reset_errors(&mut self) {
        self.consecutive_errors = 0;
        self.next_retry = None;
        self.retry = retry_strategy(self.parts.timings.network_backoff);
    }

    fn on_result(&mut self, transcript: &str, is_final: bool) {
        if !self.listening || self.restarting || self.stopping {
            debug!("Result while not listening dropped: '{}'", transcript);
            return;
        }

        let shown = self.parts.normalizer.tidy(transcript);
        if shown.is_empty() {
            return;
        }
        self.parts
            .transcripts
            .dispatch(&TranscriptEvent::user(shown, is_final));

        if !is_final {
            return;
        }
        if self.consecutive_errors > 0 {
            self.reset_errors();
            self.backoff_until = None;
        }

        match self.mode {
            Mode::Command => self.on_command_result(transcript),
            Mode::Dictation => self.on_dictation_result(transcript),
        }
    }

    fn on_command_result(&mut self, transcript: &str) {
        let text = self.parts.normalizer.normalize(transcript);
        debug!("Heard: '{}'", text);

        if let Some(event) = self.parts.interpreter.interpret(&text) {
            self.dispatch_command(&event);
            if event.command == Command::Refresh {
                self.restart();
            }
        }
    }

    fn on_dictation_result(&mut self, transcript: &str) {
        let fragment = self.parts.normalizer.fragment(transcript);

        match self.parts.dictation.on_fragment(&fragment) {
            DictationOutcome::Continue(update) => {
                let Some(callback) = self.on_dictation.clone() else {
                    debug!("No dictation consumer for '{}'", update.fragment);
                    return;
                };
                if catch_unwind(AssertUnwindSafe(|| callback(&update))).is_err() {
                    error!("❌ Dictation callback panicked");
                }
            }
            DictationOutcome::Exit(event) => {
                self.leave_dictation();
                self.dispatch_command(&event);
            }
            DictationOutcome::Restart => self.restart(),
        }
    }

    fn dispatch_command(&self, event: &CommandEvent) {
        let delivered = self.parts.commands.dispatch(event);
        debug!("Command '{}' delivered to {} listener(s)", event.command, delivered);
    }
}
