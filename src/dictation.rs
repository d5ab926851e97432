//! Dictation capture
//!
//! Buffers free-text fragments while watching every fragment for the
//! reserved exit phrase and the recognizer-restart escape hatch.

use crate::commands::{Command, CommandEvent};
use crate::utils::{find_phrase, FuzzyMatcher};
use tracing::{debug, info};

/// Phrases that end dictation and submit the buffer as a task
pub const EXIT_PHRASES: &[&str] = &[
    "start task",
    "start desk",
    "star task",
    "stat task",
    "start tusk",
    "starts task",
];

/// Phrases that force a recognizer restart from inside dictation
pub const RESTART_PHRASES: &[&str] = &["refresh", "restart", "reset", "refreshed", "resend"];

/// One recognized piece of dictation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictationFragment {
    /// Normalized, lower-case text used for matching
    pub text: String,
    /// Speaker casing, used for the buffer
    pub original: String,
}

impl DictationFragment {
    /// Fragment whose text is already normalized
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            original: text.clone(),
            text,
        }
    }
}

/// Progress report handed to the dictation consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictationUpdate {
    /// The fragment just heard
    pub fragment: String,
    /// Everything dictated so far
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictationOutcome {
    /// Keep dictating; the buffer now holds `text`
    Continue(DictationUpdate),
    /// Exit phrase heard; carries a `start_task` built from the buffer
    Exit(CommandEvent),
    /// Restart phrase heard; the buffer is kept
    Restart,
}

/// Accumulates dictated text
#[derive(Debug, Clone, Default)]
pub struct DictationCapture {
    matcher: FuzzyMatcher,
    buffer: Vec<String>,
}

impl DictationCapture {
    pub fn new(matcher: FuzzyMatcher) -> Self {
        Self {
            matcher,
            buffer: Vec::new(),
        }
    }

    /// Current buffer content
    pub fn text(&self) -> String {
        self.buffer.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Feed one fragment
    pub fn on_fragment(&mut self, fragment: &DictationFragment) -> DictationOutcome {
        if self.matcher.matches(&fragment.text, EXIT_PHRASES) {
            self.append_before_exit(fragment);
            let text = self.text();
            self.buffer.clear();
            info!("📝 Dictation finished: '{}'", text);
            return DictationOutcome::Exit(CommandEvent::new(Command::StartTask, text));
        }

        if self.matcher.matches(&fragment.text, RESTART_PHRASES) {
            info!("🔄 Restart requested from dictation");
            return DictationOutcome::Restart;
        }

        if !fragment.original.is_empty() {
            self.buffer.push(fragment.original.clone());
        }
        debug!("Dictation buffer: '{}'", self.text());

        DictationOutcome::Continue(DictationUpdate {
            fragment: fragment.original.clone(),
            text: self.text(),
        })
    }

    /// Keep words spoken ahead of the exit phrase ("keys start task",
    /// "buy milk star desk")
    fn append_before_exit(&mut self, fragment: &DictationFragment) {
        let words: Vec<&str> = fragment.text.split_whitespace().collect();
        let literal = EXIT_PHRASES.iter().find_map(|phrase| {
            let needle: Vec<&str> = phrase.split_whitespace().collect();
            find_phrase(&words, &needle)
        });
        let start = literal.or_else(|| {
            EXIT_PHRASES
                .iter()
                .filter_map(|phrase| self.matcher.find_pattern(&words, phrase))
                .min()
        });
        if start.is_none() {
            debug!("Exit phrase position not found in '{}'", fragment.text);
        }

        if let Some(start) = start.filter(|&s| s > 0) {
            // Normalization can drop punctuation-only words, so fall back to
            // the lower-case form when the word counts disagree
            let original: Vec<&str> = fragment.original.split_whitespace().collect();
            let prefix = if original.len() == words.len() {
                original[..start].join(" ")
            } else {
                words[..start].join(" ")
            };
            self.buffer.push(prefix);
        }
    }
}
