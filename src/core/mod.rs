//! Core processing modules
//!
//! Transcript clean-up shared by command matching and dictation.

pub mod text_normalizer;

pub use text_normalizer::TranscriptNormalizer;
