//! Line-based recognizer for terminals
//!
//! Every line typed while started is reported as a final result. Lines
//! starting with `!` inject host events: `!network`, `!denied`,
//! `!nospeech`, `!end`.

use super::{Recognizer, RecognizerErrorCode, RecognizerEventSender};
use crate::error::{VoiceError, VoiceResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub struct StdinRecognizer {
    running: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    events: RecognizerEventSender,
}

impl std::fmt::Debug for StdinRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinRecognizer")
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl StdinRecognizer {
    /// Spawn the stdin reader. The receiver fires once stdin closes.
    pub fn spawn(events: RecognizerEventSender) -> (Self, oneshot::Receiver<()>) {
        let running = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let (eof_tx, eof_rx) = oneshot::channel();

        let reader_running = running.clone();
        let reader_events = events.clone();
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => handle_line(&line, &reader_running, &reader_events),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("⚠️ stdin read failed: {}", e);
                        break;
                    }
                }
            }
            info!("⌨️ stdin closed");
            reader_closed.store(true, Ordering::SeqCst);
            if reader_running.swap(false, Ordering::SeqCst) {
                reader_events.ended();
            }
            let _ = eof_tx.send(());
        });

        (
            Self {
                running,
                closed,
                events,
            },
            eof_rx,
        )
    }
}

fn handle_line(line: &str, running: &AtomicBool, events: &RecognizerEventSender) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match line {
        "!network" => fail(RecognizerErrorCode::Network, running, events),
        "!denied" => fail(RecognizerErrorCode::NotAllowed, running, events),
        "!nospeech" => events.error(RecognizerErrorCode::NoSpeech),
        "!end" => {
            if running.swap(false, Ordering::SeqCst) {
                events.ended();
            }
        }
        _ if running.load(Ordering::SeqCst) => events.result(line, true),
        _ => debug!("Recognizer stopped, dropping '{}'", line),
    }
}

/// Report an error and end the session, as hosts do
fn fail(code: RecognizerErrorCode, running: &AtomicBool, events: &RecognizerEventSender) {
    events.error(code);
    if running.swap(false, Ordering::SeqCst) {
        events.ended();
    }
}

impl Recognizer for StdinRecognizer {
    fn start(&mut self) -> VoiceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoiceError::Recognizer("stdin is closed".to_string()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::RecognizerBusy);
        }
        self.events.started();
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            self.events.ended();
        }
        Ok(())
    }

    fn abort(&mut self) -> VoiceResult<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            self.events.error(RecognizerErrorCode::Aborted);
            self.events.ended();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdin"
    }
}
