//! Utility modules

pub mod fuzzy;

pub use fuzzy::{find_phrase, matches, FuzzyMatcher, CONFUSIONS, DEFAULT_THRESHOLD};
