//! Text Normalization
//!
//! Cleans raw recognizer transcripts before command matching and dictation.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::dictation::DictationFragment;

lazy_static! {
    /// Punctuation the recognizer adds at phrase boundaries ("Start task.")
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s'-]").expect("valid punctuation regex");
}

/// Normalizes spoken text to fix common recognition errors
#[derive(Debug, Clone, Default)]
pub struct TranscriptNormalizer {
    /// Manual corrections from config, lower-cased word sequences
    corrections: Vec<(Vec<String>, String)>,
}

impl TranscriptNormalizer {
    /// Create a new transcript normalizer
    pub fn new(corrections: &HashMap<String, String>) -> Self {
        let mut corrections: Vec<(Vec<String>, String)> = corrections
            .iter()
            .map(|(from, to)| {
                let from: Vec<String> = from
                    .to_lowercase()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                (from, to.to_lowercase())
            })
            .filter(|(from, _)| !from.is_empty())
            .collect();

        // Longest phrases first so "seen description" wins over "seen"
        corrections.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self { corrections }
    }

    /// Lower-case, strip punctuation, apply corrections
    pub fn normalize(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let cleaned = PUNCTUATION.replace_all(&lower, " ");
        let words: Vec<&str> = cleaned.split_whitespace().collect();
        self.apply_corrections(&words).join(" ")
    }

    /// Keep the speaker's casing, only trim and collapse whitespace
    pub fn tidy(&self, text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Build a dictation fragment carrying both forms of the text
    pub fn fragment(&self, text: &str) -> DictationFragment {
        DictationFragment {
            text: self.normalize(text),
            original: self.tidy(text),
        }
    }

    /// Replace whole-word phrase matches only
    fn apply_corrections(&self, words: &[&str]) -> Vec<String> {
        let mut result: Vec<String> = Vec::with_capacity(words.len());
        let mut i = 0;

        'outer: while i < words.len() {
            for (from, to) in &self.corrections {
                let end = i + from.len();
                if end <= words.len()
                    && words[i..end].iter().zip(from).all(|(w, f)| *w == f.as_str())
                {
                    result.extend(to.split_whitespace().map(str::to_string));
                    i = end;
                    continue 'outer;
                }
            }
            result.push(words[i].to_string());
            i += 1;
        }

        result
    }
}
