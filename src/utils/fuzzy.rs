//! Fuzzy phrase matching for voice commands
//!
//! Maps a noisy transcript onto canonical phrases using exact, substring,
//! word-overlap and confusion-table checks. Pure functions, no state.

/// Default share of pattern words that must find a transcript counterpart
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Shortest token allowed to match as the stem of another token
const MIN_CONTAINED_LEN: usize = 3;

/// Most letters a stem match may leave over ("task" in "tasks",
/// "refresh" in "refreshing", never "yes" in "yesterday")
const MAX_STEM_SUFFIX: usize = 3;

/// Words the recognizer commonly hears instead of the intended one.
/// Looked up in both directions.
pub const CONFUSIONS: &[(&str, &[&str])] = &[
    ("scene", &["seen", "seem", "sean"]),
    ("task", &["desk", "tusk", "tax", "toss"]),
    ("off", &["of"]),
    ("start", &["star", "stat", "stark"]),
    ("camera", &["camra", "kamera"]),
    ("guide", &["guy"]),
    ("yes", &["yas", "yess"]),
    ("refresh", &["afresh"]),
    ("reset", &["recent"]),
];

/// Word-overlap matcher with a tunable threshold and confusion table
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    threshold: f64,
    confusions: &'static [(&'static str, &'static [&'static str])],
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl FuzzyMatcher {
    /// Create a matcher using the built-in confusion table
    pub fn new(threshold: f64) -> Self {
        Self::with_confusions(threshold, CONFUSIONS)
    }

    pub fn with_confusions(
        threshold: f64,
        confusions: &'static [(&'static str, &'static [&'static str])],
    ) -> Self {
        Self {
            threshold: threshold.clamp(f64::EPSILON, 1.0),
            confusions,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Check whether the transcript matches any of the patterns.
    ///
    /// The transcript must already be lower-cased and trimmed.
    pub fn matches(&self, transcript: &str, patterns: &[&str]) -> bool {
        if transcript.is_empty() {
            return false;
        }
        patterns
            .iter()
            .any(|pattern| self.matches_pattern(transcript, pattern))
    }

    /// Match a single canonical phrase
    pub fn matches_pattern(&self, transcript: &str, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        let transcript_words: Vec<&str> = transcript.split_whitespace().collect();
        let pattern_words: Vec<&str> = pattern.split_whitespace().collect();

        if transcript_words.is_empty() || pattern_words.is_empty() {
            return false;
        }

        // 1. Exact or phrase containment, aligned on words. A lone word
        // never claims a longer phrase by containment.
        if transcript_words == pattern_words
            || contains_phrase(&transcript_words, &pattern_words)
            || (transcript_words.len() >= 2 && contains_phrase(&pattern_words, &transcript_words))
        {
            return true;
        }

        // 2. Word overlap, order independent
        let found = pattern_words
            .iter()
            .filter(|p| {
                transcript_words
                    .iter()
                    .any(|t| self.words_match(p, t))
            })
            .count();

        found >= self.required_words(pattern_words.len())
    }

    /// Minimum number of pattern words that must be found
    pub fn required_words(&self, pattern_len: usize) -> usize {
        // Epsilon keeps e.g. 0.7 * 10 at 7 despite float rounding
        let needed = (self.threshold * pattern_len as f64 - 1e-9).ceil() as usize;
        needed.clamp(1, pattern_len.max(1))
    }

    fn words_match(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        if short.len() >= MIN_CONTAINED_LEN
            && long.len() - short.len() <= MAX_STEM_SUFFIX
            && long.starts_with(short)
        {
            return true;
        }
        self.are_confusable(a, b)
    }

    /// Word index where a run of words matching `pattern` starts.
    ///
    /// Runs are as long as the pattern, so "buy milk star desk" locates
    /// "start task" at index 2.
    pub fn find_pattern(&self, words: &[&str], pattern: &str) -> Option<usize> {
        let len = pattern.split_whitespace().count();
        if len == 0 || len > words.len() {
            return None;
        }
        words
            .windows(len)
            .position(|run| self.matches_pattern(&run.join(" "), pattern))
    }

    /// Symmetric confusion-table lookup
    pub fn are_confusable(&self, a: &str, b: &str) -> bool {
        self.confusions.iter().any(|(word, alts)| {
            (*word == a && alts.contains(&b)) || (*word == b && alts.contains(&a))
        })
    }
}

/// True when `needle` appears as a contiguous run of words in `haystack`
fn contains_phrase(haystack: &[&str], needle: &[&str]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Word index where `needle` starts inside `haystack`
pub fn find_phrase(haystack: &[&str], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Match with the default threshold and confusion table
pub fn matches(transcript: &str, patterns: &[&str]) -> bool {
    FuzzyMatcher::default().matches(transcript, patterns)
}
