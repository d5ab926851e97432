//! Mock Recognizer for Testing
//!
//! Records every request and reports host-like events: `Started` after a
//! start, a single `Ended` after stop or abort.

use airis_voice::asr::{Recognizer, RecognizerErrorCode, RecognizerEventSender};
use airis_voice::error::{VoiceError, VoiceResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerCall {
    Start,
    Stop,
    Abort,
}

/// Cloneable mock; tests keep one clone and hand the other to the service
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    events: RecognizerEventSender,
    pub calls: Arc<Mutex<Vec<RecognizerCall>>>,
    running: Arc<AtomicBool>,
    /// Report `Ended` when asked to stop
    pub end_on_stop: Arc<AtomicBool>,
    /// Refuse every start with a permission error
    pub deny_start: Arc<AtomicBool>,
    /// Fail every start with a device error
    pub fail_start: Arc<AtomicBool>,
}

impl MockRecognizer {
    pub fn new(events: RecognizerEventSender) -> Self {
        Self {
            events,
            calls: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            end_on_stop: Arc::new(AtomicBool::new(true)),
            deny_start: Arc::new(AtomicBool::new(false)),
            fail_start: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: RecognizerCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn starts(&self) -> usize {
        self.count(RecognizerCall::Start)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Final result, as if the user said `text`
    pub fn say(&self, text: &str) {
        self.events.result(text, true);
    }

    pub fn interim(&self, text: &str) {
        self.events.result(text, false);
    }

    /// Error without ending the session
    pub fn error(&self, code: RecognizerErrorCode) {
        self.events.error(code);
    }

    /// Error followed by the end event, the usual host behaviour
    pub fn fail(&self, code: RecognizerErrorCode) {
        self.events.error(code);
        self.end();
    }

    /// Session ends on its own (silence timeout, host hiccup)
    pub fn end(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.events.ended();
        }
    }

    fn record(&self, call: RecognizerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Recognizer for MockRecognizer {
    fn start(&mut self) -> VoiceResult<()> {
        self.record(RecognizerCall::Start);
        if self.deny_start.load(Ordering::SeqCst) {
            return Err(VoiceError::PermissionDenied);
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(VoiceError::Recognizer("microphone unavailable".to_string()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::RecognizerBusy);
        }
        self.events.started();
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<()> {
        self.record(RecognizerCall::Stop);
        if self.end_on_stop.load(Ordering::SeqCst) {
            self.end();
        }
        Ok(())
    }

    fn abort(&mut self) -> VoiceResult<()> {
        self.record(RecognizerCall::Abort);
        if self.end_on_stop.load(Ordering::SeqCst) {
            self.end();
        } else {
            // A forced abort always takes effect, even when no end is reported
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airis_voice::asr::{event_channel, RecognizerEvent};

    #[test]
    fn test_mock_recognizer_reports_single_end() {
        let (tx, mut rx) = event_channel();
        let mut mock = MockRecognizer::new(tx);

        mock.start().unwrap();
        mock.stop().unwrap();
        mock.abort().unwrap();

        assert_eq!(rx.try_recv().ok(), Some(RecognizerEvent::Started));
        assert_eq!(rx.try_recv().ok(), Some(RecognizerEvent::Ended));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            mock.calls(),
            vec![
                RecognizerCall::Start,
                RecognizerCall::Stop,
                RecognizerCall::Abort
            ]
        );
    }

    #[test]
    fn test_mock_recognizer_busy_when_running() {
        let (tx, _rx) = event_channel();
        let mut mock = MockRecognizer::new(tx);
        mock.start().unwrap();
        assert!(matches!(mock.start(), Err(VoiceError::RecognizerBusy)));
    }
}
